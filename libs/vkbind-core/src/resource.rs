use std::cell::Cell;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use crate::device::Device;

/// What barrier inference needs from an image: its aspect mask and a way to
/// request a state transition on a command buffer.
pub trait ImageResource {
    fn request_state(
        &self,
        command_buffer: vk::CommandBuffer,
        stages: vk::PipelineStageFlags2,
        access: vk::AccessFlags2,
        layout: vk::ImageLayout,
        aspect_mask: vk::ImageAspectFlags,
    );

    fn aspect_mask(&self) -> vk::ImageAspectFlags;
}

pub fn aspect_mask_by_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::X8_D24_UNORM_PACK32 | vk::Format::D32_SFLOAT => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

pub struct BufferInfo {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub alignment: vk::DeviceSize,
    pub mappable: bool,
}

pub struct Buffer {
    pub allocation: Option<Allocation>,
    pub info: BufferInfo,
    pub buffer: vk::Buffer,
    pub device: Arc<Device>,
}

impl Buffer {
    pub fn create(device: &Arc<Device>, info: impl Into<BufferInfo>) -> Self {
        let backend = device.clone();
        let info = info.into();

        let buffer_info = vk::BufferCreateInfo {
            size: info.size,
            usage: info.usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };

        let buffer = unsafe { backend.device.create_buffer(&buffer_info, None).unwrap() };
        let mut requirements = unsafe { backend.device.get_buffer_memory_requirements(buffer) };
        requirements.alignment = requirements.alignment.max(info.alignment);

        let memory_location = if info.mappable {
            MemoryLocation::CpuToGpu
        } else {
            MemoryLocation::GpuOnly
        };

        let allocation = backend
            .allocator
            .as_ref()
            .unwrap()
            .lock()
            .unwrap()
            .allocate(&AllocationCreateDesc {
                name: "buffer",
                requirements,
                location: memory_location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .unwrap();

        unsafe {
            backend
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .unwrap();
        }

        Self {
            allocation: Some(allocation),
            buffer,
            device: backend,
            info,
        }
    }

    pub fn upload<T: Pod>(&mut self, data: &[T]) {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        self.allocation
            .as_mut()
            .unwrap()
            .mapped_slice_mut()
            .unwrap()[..bytes.len()]
            .copy_from_slice(bytes);
    }

    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset: 0,
            range: self.info.size,
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.device
            .allocator
            .as_ref()
            .unwrap()
            .lock()
            .unwrap()
            .free(self.allocation.take().unwrap())
            .unwrap();
        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
        }
    }
}

pub struct ImageInfo {
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
}

#[derive(Clone, Copy)]
struct TrackedState {
    stages: vk::PipelineStageFlags2,
    access: vk::AccessFlags2,
    layout: vk::ImageLayout,
}

pub struct Image {
    pub allocation: Option<Allocation>,
    pub info: ImageInfo,
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub device: Arc<Device>,
    state: Cell<TrackedState>,
}

impl Image {
    pub fn create(device: &Arc<Device>, info: ImageInfo) -> Self {
        let backend = device.clone();

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(info.format)
            .extent(info.extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(info.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { backend.device.create_image(&image_info, None).unwrap() };
        let requirements = unsafe { backend.device.get_image_memory_requirements(image) };

        let allocation = backend
            .allocator
            .as_ref()
            .unwrap()
            .lock()
            .unwrap()
            .allocate(&AllocationCreateDesc {
                name: "image",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .unwrap();

        unsafe {
            backend
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .unwrap();
        }

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(info.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_mask_by_format(info.format),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = unsafe { backend.device.create_image_view(&view_info, None).unwrap() };

        Self {
            allocation: Some(allocation),
            info,
            image,
            view,
            device: backend,
            state: Cell::new(TrackedState {
                stages: vk::PipelineStageFlags2::NONE,
                access: vk::AccessFlags2::NONE,
                layout: vk::ImageLayout::UNDEFINED,
            }),
        }
    }

    pub fn descriptor_info(&self, layout: vk::ImageLayout) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: self.view,
            image_layout: layout,
        }
    }
}

impl ImageResource for Image {
    fn request_state(
        &self,
        command_buffer: vk::CommandBuffer,
        stages: vk::PipelineStageFlags2,
        access: vk::AccessFlags2,
        layout: vk::ImageLayout,
        aspect_mask: vk::ImageAspectFlags,
    ) {
        let prev = self.state.get();
        if prev.stages == stages && prev.access == access && prev.layout == layout {
            return;
        }

        let barrier = vk::ImageMemoryBarrier2::builder()
            .src_stage_mask(prev.stages)
            .src_access_mask(prev.access)
            .dst_stage_mask(stages)
            .dst_access_mask(access)
            .old_layout(prev.layout)
            .new_layout(layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count: vk::REMAINING_ARRAY_LAYERS,
            })
            .build();

        let dependency =
            vk::DependencyInfo::builder().image_memory_barriers(std::slice::from_ref(&barrier));

        unsafe {
            self.device
                .device
                .cmd_pipeline_barrier2(command_buffer, &dependency);
        }

        self.state.set(TrackedState {
            stages,
            access,
            layout,
        });
    }

    fn aspect_mask(&self) -> vk::ImageAspectFlags {
        aspect_mask_by_format(self.info.format)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_image_view(self.view, None);
        }
        self.device
            .allocator
            .as_ref()
            .unwrap()
            .lock()
            .unwrap()
            .free(self.allocation.take().unwrap())
            .unwrap();
        unsafe {
            self.device.device.destroy_image(self.image, None);
        }
    }
}
