use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use ash::vk;
use log::{trace, warn};

use crate::device::DescriptorDevice;

pub const MAX_DESCRIPTOR_BINDINGS: usize = 32;

// Upper bound backing a variable-length slot until its real size arrives at
// allocation time.
const VARIABLE_COUNT_LIMIT: u32 = 255;

fn is_dynamic_descriptor(ty: vk::DescriptorType) -> bool {
    ty == vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
        || ty == vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
}

/// One slot of a set layout. `descriptor_count == 0` marks a variable-length
/// slot whose size is chosen at allocation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BindingSlot {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub descriptor_count: u32,
    pub stage_flags: vk::ShaderStageFlags,
}

/// A single already-parsed reflection record for one shader stage.
#[derive(Debug, Clone)]
pub struct ReflectedBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub array_dims: Vec<u32>,
}

/// The shape of one descriptor set, independent of any native object.
#[derive(Debug, Clone)]
pub struct DescriptorSetInfo {
    bindings: [BindingSlot; MAX_DESCRIPTOR_BINDINGS],
    used: u32,
    max_used_binding: u32,
    dyn_offsets: u32,
}

impl Default for DescriptorSetInfo {
    fn default() -> Self {
        Self {
            bindings: [BindingSlot::default(); MAX_DESCRIPTOR_BINDINGS],
            used: 0,
            max_used_binding: 0,
            dyn_offsets: 0,
        }
    }
}

impl DescriptorSetInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_used(&self, binding: u32) -> bool {
        (binding as usize) < MAX_DESCRIPTOR_BINDINGS && self.used & (1u32 << binding) != 0
    }

    pub fn slot(&self, binding: u32) -> &BindingSlot {
        if !self.is_used(binding) {
            panic!("layout has no binding slot {}", binding);
        }
        &self.bindings[binding as usize]
    }

    pub fn max_used_binding(&self) -> u32 {
        self.max_used_binding
    }

    pub fn dynamic_offsets(&self) -> u32 {
        self.dyn_offsets
    }

    /// Used slots in ascending binding order.
    pub fn slots(&self) -> impl Iterator<Item = &BindingSlot> + '_ {
        self.bindings[..self.max_used_binding as usize]
            .iter()
            .enumerate()
            .filter(move |(index, _)| self.used & (1u32 << *index) != 0)
            .map(|(_, slot)| slot)
    }

    pub fn add_slot(&mut self, slot: BindingSlot) {
        let index = slot.binding as usize;
        if index >= MAX_DESCRIPTOR_BINDINGS {
            panic!(
                "binding {} out of range ({} slots supported)",
                slot.binding, MAX_DESCRIPTOR_BINDINGS
            );
        }

        if self.is_used(slot.binding) {
            let existing = &mut self.bindings[index];
            if existing.descriptor_type != slot.descriptor_type
                || existing.descriptor_count != slot.descriptor_count
            {
                panic!(
                    "incompatible bindings at slot {}: {:?} x{} vs {:?} x{}",
                    slot.binding,
                    existing.descriptor_type,
                    existing.descriptor_count,
                    slot.descriptor_type,
                    slot.descriptor_count
                );
            }
            existing.stage_flags |= slot.stage_flags;
            return;
        }

        self.used |= 1u32 << index;
        self.bindings[index] = slot;
        self.max_used_binding = self.max_used_binding.max(slot.binding + 1);

        if is_dynamic_descriptor(slot.descriptor_type) {
            self.dyn_offsets += 1;
        }
    }

    /// Folds one shader stage's reflection records into this shape. Array
    /// dimensions are flattened into a single count; a zero dimension yields
    /// the variable-length sentinel.
    pub fn parse_stage(&mut self, stage: vk::ShaderStageFlags, bindings: &[ReflectedBinding]) {
        for reflected in bindings {
            let count = reflected.array_dims.iter().product::<u32>();
            self.add_slot(BindingSlot {
                binding: reflected.binding,
                descriptor_type: reflected.descriptor_type,
                descriptor_count: count,
                stage_flags: stage,
            });
        }
    }

    pub fn merge(&mut self, other: &DescriptorSetInfo) {
        for binding in 0..other.max_used_binding {
            if !other.is_used(binding) {
                continue;
            }
            self.add_slot(other.bindings[binding as usize]);
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn create_layout(&self, device: &dyn DescriptorDevice) -> vk::DescriptorSetLayout {
        let mut api_bindings = Vec::with_capacity(self.used.count_ones() as usize);
        let mut binding_flags = Vec::with_capacity(self.used.count_ones() as usize);
        let mut variable_slots = 0u32;

        for slot in self.slots() {
            let variable = slot.descriptor_count == 0;
            variable_slots += variable as u32;
            api_bindings.push(
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(slot.binding)
                    .descriptor_type(slot.descriptor_type)
                    .descriptor_count(if variable {
                        VARIABLE_COUNT_LIMIT
                    } else {
                        slot.descriptor_count
                    })
                    .stage_flags(slot.stage_flags)
                    .build(),
            );
            binding_flags.push(if variable {
                vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT
            } else {
                vk::DescriptorBindingFlags::empty()
            });
        }

        if variable_slots > 1 {
            panic!(
                "layout declares {} variable-length slots, at most one is supported",
                variable_slots
            );
        }

        let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::builder()
            .binding_flags(&binding_flags);
        let info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(&api_bindings)
            .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
            .push_next(&mut flags_info);

        device
            .create_descriptor_set_layout(&info)
            .unwrap_or_else(|err| panic!("descriptor set layout creation failed: {err}"))
    }
}

impl PartialEq for DescriptorSetInfo {
    fn eq(&self, other: &Self) -> bool {
        if self.used != other.used {
            return false;
        }
        for binding in 0..self.max_used_binding {
            if self.is_used(binding)
                && self.bindings[binding as usize] != other.bindings[binding as usize]
            {
                return false;
            }
        }
        true
    }
}

impl Eq for DescriptorSetInfo {}

// Only the used slots feed the hash, so two shapes built along different
// paths hash identically.
impl Hash for DescriptorSetInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for slot in self.slots() {
            slot.hash(state);
        }
    }
}

#[derive(Clone, Copy, Hash, PartialEq, Eq)]
pub struct DescriptorLayoutId(usize);

impl Debug for DescriptorLayoutId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for DescriptorLayoutId {
    fn from(val: usize) -> Self {
        Self(val)
    }
}

impl Deref for DescriptorLayoutId {
    type Target = usize;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Deduplicates set shapes and owns one native layout per unique shape.
#[derive(Default)]
pub struct LayoutCache {
    map: HashMap<DescriptorSetInfo, DescriptorLayoutId>,
    infos: Vec<DescriptorSetInfo>,
    layouts: Vec<vk::DescriptorSetLayout>,
}

impl LayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// The single dedup point: an already-registered shape returns its
    /// existing identifier and native layout, anything else gets the next
    /// identifier and a freshly created layout.
    pub fn register_or_get(
        &mut self,
        device: &dyn DescriptorDevice,
        info: &DescriptorSetInfo,
    ) -> (DescriptorLayoutId, vk::DescriptorSetLayout) {
        if let Some(&id) = self.map.get(info) {
            return (id, self.layouts[*id]);
        }

        let id = DescriptorLayoutId(self.infos.len());
        let layout = info.create_layout(device);
        self.map.insert(info.clone(), id);
        self.infos.push(info.clone());
        self.layouts.push(layout);
        trace!(
            "registered descriptor layout {:?} ({} bindings)",
            id,
            info.used.count_ones()
        );
        (id, layout)
    }

    pub fn register(
        &mut self,
        device: &dyn DescriptorDevice,
        info: &DescriptorSetInfo,
    ) -> DescriptorLayoutId {
        self.register_or_get(device, info).0
    }

    pub fn info(&self, id: DescriptorLayoutId) -> &DescriptorSetInfo {
        self.infos
            .get(*id)
            .unwrap_or_else(|| panic!("descriptor layout id {:?} out of range", id))
    }

    pub fn layout(&self, id: DescriptorLayoutId) -> vk::DescriptorSetLayout {
        *self
            .layouts
            .get(*id)
            .unwrap_or_else(|| panic!("descriptor layout id {:?} out of range", id))
    }

    /// Full-context teardown. Identifiers issued before a clear are invalid
    /// afterwards.
    pub fn clear(&mut self, device: &dyn DescriptorDevice) {
        for &layout in &self.layouts {
            device.destroy_descriptor_set_layout(layout);
        }
        self.map.clear();
        self.infos.clear();
        self.layouts.clear();
    }
}

impl Drop for LayoutCache {
    fn drop(&mut self) {
        if !self.layouts.is_empty() {
            warn!(
                "layout cache dropped with {} live native layouts, clear() was never called",
                self.layouts.len()
            );
        }
    }
}
