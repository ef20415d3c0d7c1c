use std::sync::Arc;

use ash::vk;
use log::trace;

use crate::device::DescriptorDevice;
use crate::frame::FrameCounter;
use crate::layout::{DescriptorLayoutId, LayoutCache};
use crate::set::{BarrierPolicy, Binding, DescriptorSet};

// Process-wide arena budgets. Exhaustion means one of these was undersized;
// fix it here, not at the call site.
pub const MAX_SETS: u32 = 2048;
const NUM_UNIFORM_BUFFERS: u32 = 2048;
const NUM_STORAGE_BUFFERS: u32 = 512;
const NUM_SAMPLERS: u32 = 128;
const NUM_SAMPLED_IMAGES: u32 = 512;
const NUM_STORAGE_IMAGES: u32 = 512;
const NUM_COMBINED_IMAGE_SAMPLERS: u32 = 2048;

const POOL_SIZES: [vk::DescriptorPoolSize; 6] = [
    vk::DescriptorPoolSize {
        ty: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: NUM_UNIFORM_BUFFERS,
    },
    vk::DescriptorPoolSize {
        ty: vk::DescriptorType::STORAGE_BUFFER,
        descriptor_count: NUM_STORAGE_BUFFERS,
    },
    vk::DescriptorPoolSize {
        ty: vk::DescriptorType::SAMPLER,
        descriptor_count: NUM_SAMPLERS,
    },
    vk::DescriptorPoolSize {
        ty: vk::DescriptorType::SAMPLED_IMAGE,
        descriptor_count: NUM_SAMPLED_IMAGES,
    },
    vk::DescriptorPoolSize {
        ty: vk::DescriptorType::STORAGE_IMAGE,
        descriptor_count: NUM_STORAGE_IMAGES,
    },
    vk::DescriptorPoolSize {
        ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        descriptor_count: NUM_COMBINED_IMAGE_SAMPLERS,
    },
];

/// A ring of native descriptor arenas, one per frame in flight. Sets are
/// never freed individually; the whole arena is reset when its frame slot
/// comes around again.
pub struct DynamicDescriptorPool {
    device: Arc<dyn DescriptorDevice>,
    frames: Arc<FrameCounter>,
    pools: Vec<vk::DescriptorPool>,
}

impl DynamicDescriptorPool {
    pub fn new(device: Arc<dyn DescriptorDevice>, frames: Arc<FrameCounter>) -> Self {
        let info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND)
            .max_sets(MAX_SETS)
            .pool_sizes(&POOL_SIZES);

        let pools = (0..frames.in_flight())
            .map(|_| {
                device
                    .create_descriptor_pool(&info)
                    .unwrap_or_else(|err| panic!("descriptor pool creation failed: {err}"))
            })
            .collect();

        Self {
            device,
            frames,
            pools,
        }
    }

    /// Resets the arena of the frame slot that just became current. Call
    /// exactly once per frame, before any allocation against that slot.
    pub fn begin_frame(&self) {
        let slot = self.frames.slot();
        trace!("resetting descriptor arena {}", slot);
        self.device
            .reset_descriptor_pool(self.pools[slot])
            .unwrap_or_else(|err| panic!("descriptor pool reset failed: {err}"));
    }

    /// Full-context teardown path: reclaims every arena unconditionally.
    pub fn reset_all(&self) {
        for &pool in &self.pools {
            self.device
                .reset_descriptor_pool(pool)
                .unwrap_or_else(|err| panic!("descriptor pool reset failed: {err}"));
        }
    }

    pub fn is_set_valid(&self, set: &DescriptorSet) -> bool {
        self.frames.current() - set.frame_tag() < self.frames.in_flight() as u64
    }

    pub fn allocate(
        &self,
        layouts: &LayoutCache,
        layout_id: DescriptorLayoutId,
        bindings: Vec<Binding>,
        command_buffer: vk::CommandBuffer,
        barrier_policy: BarrierPolicy,
    ) -> DescriptorSet {
        let layout = layouts.layout(layout_id);

        // A single multi-element binding carries the concrete size for a
        // variable-length slot.
        let variable_count = match bindings.as_slice() {
            [binding] if binding.count() > 1 => Some(binding.count()),
            _ => None,
        };

        let set = self
            .device
            .allocate_descriptor_set(self.pools[self.frames.slot()], layout, variable_count)
            .unwrap_or_else(|err| {
                panic!("descriptor set allocation failed, arena budget exceeded: {err}")
            });

        DescriptorSet::new(
            self.frames.current(),
            layout_id,
            set,
            bindings,
            command_buffer,
            barrier_policy,
        )
    }
}

impl Drop for DynamicDescriptorPool {
    fn drop(&mut self) {
        for &pool in &self.pools {
            self.device.destroy_descriptor_pool(pool);
        }
        trace!("Dropped descriptor pool ring.");
    }
}
