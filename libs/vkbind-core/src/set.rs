use std::sync::Arc;

use ash::vk;

use crate::layout::DescriptorLayoutId;
use crate::resource::ImageResource;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BarrierPolicy {
    #[default]
    Auto,
    Suppress,
}

#[derive(Clone)]
pub struct BufferBinding {
    pub descriptor_info: vk::DescriptorBufferInfo,
}

#[derive(Clone)]
pub struct ImageBinding {
    pub image: Arc<dyn ImageResource>,
    pub descriptor_info: vk::DescriptorImageInfo,
    pub aspect_mask: vk::ImageAspectFlags,
}

impl ImageBinding {
    pub fn new(image: Arc<dyn ImageResource>, descriptor_info: vk::DescriptorImageInfo) -> Self {
        let aspect_mask = image.aspect_mask();
        Self {
            image,
            descriptor_info,
            aspect_mask,
        }
    }
}

/// Exactly one payload kind per attachment.
#[derive(Clone)]
pub enum BindingPayload {
    Buffers(Vec<BufferBinding>),
    Images(Vec<ImageBinding>),
}

/// One caller-supplied attachment: which slot, where in its array, and the
/// resource records to write there.
#[derive(Clone)]
pub struct Binding {
    pub binding: u32,
    pub array_element: u32,
    count: u32,
    pub resources: BindingPayload,
}

impl Binding {
    pub fn buffers(binding: u32, array_element: u32, buffers: Vec<BufferBinding>) -> Self {
        let count = buffers.len() as u32;
        Self {
            binding,
            array_element,
            count,
            resources: BindingPayload::Buffers(buffers),
        }
    }

    pub fn images(binding: u32, array_element: u32, images: Vec<ImageBinding>) -> Self {
        let count = images.len() as u32;
        Self {
            binding,
            array_element,
            count,
            resources: BindingPayload::Images(images),
        }
    }

    pub fn buffer(binding: u32, buffer: BufferBinding) -> Self {
        Self::buffers(binding, 0, vec![buffer])
    }

    pub fn image(binding: u32, image: ImageBinding) -> Self {
        Self::images(binding, 0, vec![image])
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// A transient descriptor set instance. Validity is derived from the frame
/// tag, never stored: the set dies implicitly when its arena is reset.
pub struct DescriptorSet {
    frame_tag: u64,
    layout_id: DescriptorLayoutId,
    set: vk::DescriptorSet,
    bindings: Vec<Binding>,
    command_buffer: vk::CommandBuffer,
    barrier_policy: BarrierPolicy,
}

impl DescriptorSet {
    pub(crate) fn new(
        frame_tag: u64,
        layout_id: DescriptorLayoutId,
        set: vk::DescriptorSet,
        bindings: Vec<Binding>,
        command_buffer: vk::CommandBuffer,
        barrier_policy: BarrierPolicy,
    ) -> Self {
        Self {
            frame_tag,
            layout_id,
            set,
            bindings,
            command_buffer,
            barrier_policy,
        }
    }

    pub fn frame_tag(&self) -> u64 {
        self.frame_tag
    }

    pub fn layout_id(&self) -> DescriptorLayoutId {
        self.layout_id
    }

    pub fn vk_set(&self) -> vk::DescriptorSet {
        self.set
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    pub fn barrier_policy(&self) -> BarrierPolicy {
        self.barrier_policy
    }
}
