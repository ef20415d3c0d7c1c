use ash::vk;

use crate::device::DescriptorDevice;
use crate::layout::{DescriptorSetInfo, LayoutCache, MAX_DESCRIPTOR_BINDINGS};
use crate::pool::DynamicDescriptorPool;
use crate::set::{BarrierPolicy, BindingPayload, DescriptorSet};

// Residual unbound-slot rejection from the validation pass. Left disabled
// pending a decision on whether partially bound sets stay legal.
const REJECT_UNBOUND_SLOTS: bool = false;

fn is_image_descriptor(ty: vk::DescriptorType) -> bool {
    match ty {
        vk::DescriptorType::UNIFORM_BUFFER
        | vk::DescriptorType::STORAGE_BUFFER
        | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
        | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => false,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        | vk::DescriptorType::SAMPLED_IMAGE
        | vk::DescriptorType::STORAGE_IMAGE
        | vk::DescriptorType::SAMPLER => true,
        _ => panic!("descriptor write error: unsupported descriptor type {:?}", ty),
    }
}

pub(crate) fn validate_writes(set: &DescriptorSet, info: &DescriptorSetInfo) {
    let mut unbound = [0u32; MAX_DESCRIPTOR_BINDINGS];
    for binding in 0..MAX_DESCRIPTOR_BINDINGS as u32 {
        unbound[binding as usize] = if info.is_used(binding) {
            info.slot(binding).descriptor_count
        } else {
            0
        };
    }

    for binding in set.bindings() {
        if !info.is_used(binding.binding) {
            panic!(
                "descriptor write error: set layout has no slot {}",
                binding.binding
            );
        }

        let slot = info.slot(binding.binding);
        let image_required = is_image_descriptor(slot.descriptor_type);
        let image_bound = matches!(binding.resources, BindingPayload::Images(_));
        if image_required != image_bound {
            panic!(
                "descriptor write error: slot {} requires {} but {} bound",
                binding.binding,
                if image_required { "image" } else { "buffer" },
                if image_bound { "image" } else { "buffer" },
            );
        }

        unbound[binding.binding as usize] = unbound[binding.binding as usize].saturating_sub(1);
    }

    if REJECT_UNBOUND_SLOTS {
        for (binding, &left) in unbound.iter().enumerate() {
            if left > 0 {
                panic!(
                    "descriptor write error: slot {} has {} unbound resources",
                    binding, left
                );
            }
        }
    }
}

/// Native write records plus the backing arrays they point into. The backing
/// storage is sized up front and never grows afterwards: the batched update
/// call needs every pointer to stay put until it returns.
pub struct CompiledWrites {
    writes: Vec<vk::WriteDescriptorSet>,
    buffer_infos: Vec<vk::DescriptorBufferInfo>,
    image_infos: Vec<vk::DescriptorImageInfo>,
}

impl CompiledWrites {
    pub fn writes(&self) -> &[vk::WriteDescriptorSet] {
        &self.writes
    }

    pub fn buffer_infos(&self) -> &[vk::DescriptorBufferInfo] {
        &self.buffer_infos
    }

    pub fn image_infos(&self) -> &[vk::DescriptorImageInfo] {
        &self.image_infos
    }

    pub fn submit(&self, device: &dyn DescriptorDevice) {
        device.update_descriptor_sets(&self.writes);
    }
}

/// Two passes: count the buffer- and image-kind records, then fill one write
/// per attachment pointing into a contiguous sub-range of the matching
/// backing array.
pub fn compile_writes(set: &DescriptorSet, info: &DescriptorSetInfo) -> CompiledWrites {
    let mut num_buffer_info = 0usize;
    let mut num_image_info = 0usize;

    for binding in set.bindings() {
        if is_image_descriptor(info.slot(binding.binding).descriptor_type) {
            num_image_info += binding.count() as usize;
        } else {
            num_buffer_info += binding.count() as usize;
        }
    }

    let mut writes = Vec::with_capacity(set.bindings().len());
    let mut buffer_infos = vec![vk::DescriptorBufferInfo::default(); num_buffer_info];
    let mut image_infos = vec![vk::DescriptorImageInfo::default(); num_image_info];
    num_buffer_info = 0;
    num_image_info = 0;

    for binding in set.bindings() {
        let slot = info.slot(binding.binding);

        let mut write = vk::WriteDescriptorSet::builder()
            .dst_set(set.vk_set())
            .dst_binding(binding.binding)
            .dst_array_element(binding.array_element)
            .descriptor_type(slot.descriptor_type)
            .build();
        write.descriptor_count = binding.count();

        match &binding.resources {
            BindingPayload::Images(images) => {
                write.p_image_info = unsafe { image_infos.as_ptr().add(num_image_info) };
                for image in images {
                    image_infos[num_image_info] = image.descriptor_info;
                    num_image_info += 1;
                }
            }
            BindingPayload::Buffers(buffers) => {
                write.p_buffer_info = unsafe { buffer_infos.as_ptr().add(num_buffer_info) };
                for buffer in buffers {
                    buffer_infos[num_buffer_info] = buffer.descriptor_info;
                    num_buffer_info += 1;
                }
            }
        }

        writes.push(write);
    }

    CompiledWrites {
        writes,
        buffer_infos,
        image_infos,
    }
}

/// Validates the set against its layout and pushes all writes to the device
/// in one batched update.
pub fn write_set(
    device: &dyn DescriptorDevice,
    layouts: &LayoutCache,
    pool: &DynamicDescriptorPool,
    set: &DescriptorSet,
) {
    if !pool.is_set_valid(set) {
        panic!(
            "descriptor write error: set from frame {} was already reclaimed by its arena",
            set.frame_tag()
        );
    }

    let info = layouts.info(set.layout_id());
    validate_writes(set, info);
    compile_writes(set, info).submit(device);
}

const SHADER_TO_PIPELINE_STAGES: [(vk::ShaderStageFlags, vk::PipelineStageFlags2); 6] = [
    (
        vk::ShaderStageFlags::VERTEX,
        vk::PipelineStageFlags2::VERTEX_SHADER,
    ),
    (
        vk::ShaderStageFlags::TESSELLATION_CONTROL,
        vk::PipelineStageFlags2::TESSELLATION_CONTROL_SHADER,
    ),
    (
        vk::ShaderStageFlags::TESSELLATION_EVALUATION,
        vk::PipelineStageFlags2::TESSELLATION_EVALUATION_SHADER,
    ),
    (
        vk::ShaderStageFlags::GEOMETRY,
        vk::PipelineStageFlags2::GEOMETRY_SHADER,
    ),
    (
        vk::ShaderStageFlags::FRAGMENT,
        vk::PipelineStageFlags2::FRAGMENT_SHADER,
    ),
    (
        vk::ShaderStageFlags::COMPUTE,
        vk::PipelineStageFlags2::COMPUTE_SHADER,
    ),
];

pub fn shader_stage_to_pipeline_stages(stages: vk::ShaderStageFlags) -> vk::PipelineStageFlags2 {
    let mut pipeline_stages = vk::PipelineStageFlags2::NONE;
    for (shader_stage, pipeline_stage) in SHADER_TO_PIPELINE_STAGES {
        if stages.contains(shader_stage) {
            pipeline_stages |= pipeline_stage;
        }
    }
    pipeline_stages
}

pub fn descriptor_type_to_access(ty: vk::DescriptorType) -> vk::AccessFlags2 {
    match ty {
        vk::DescriptorType::SAMPLED_IMAGE | vk::DescriptorType::COMBINED_IMAGE_SAMPLER => {
            vk::AccessFlags2::SHADER_SAMPLED_READ
        }
        vk::DescriptorType::STORAGE_IMAGE => {
            vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE
        }
        _ => vk::AccessFlags2::NONE,
    }
}

impl DescriptorSet {
    /// Requests the image-layout transition each image binding relies on,
    /// derived from the slot's stage mask and descriptor type. Buffer
    /// bindings go through the separate buffer-barrier path.
    pub fn process_barriers(&self, layouts: &LayoutCache) {
        if self.barrier_policy() == BarrierPolicy::Suppress {
            return;
        }

        let info = layouts.info(self.layout_id());
        for binding in self.bindings() {
            let images = match &binding.resources {
                BindingPayload::Images(images) => images,
                BindingPayload::Buffers(_) => continue,
            };

            let slot = info.slot(binding.binding);
            // FIXME: only the first element drives the transition
            let image = &images[0];
            image.image.request_state(
                self.command_buffer(),
                shader_stage_to_pipeline_stages(slot.stage_flags),
                descriptor_type_to_access(slot.descriptor_type),
                image.descriptor_info.image_layout,
                image.aspect_mask,
            );
        }
    }
}
