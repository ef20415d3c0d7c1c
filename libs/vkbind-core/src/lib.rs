pub mod device;
pub mod frame;
pub mod layout;
pub mod pool;
pub mod resource;
pub mod set;
pub mod write;


pub use device::{DescriptorDevice, Device};
pub use frame::FrameCounter;
pub use layout::{
    BindingSlot, DescriptorLayoutId, DescriptorSetInfo, LayoutCache, ReflectedBinding,
    MAX_DESCRIPTOR_BINDINGS,
};
pub use pool::DynamicDescriptorPool;
pub use resource::{aspect_mask_by_format, Buffer, BufferInfo, Image, ImageInfo, ImageResource};
pub use set::{BarrierPolicy, Binding, BindingPayload, BufferBinding, DescriptorSet, ImageBinding};
pub use write::{
    compile_writes, descriptor_type_to_access, shader_stage_to_pipeline_stages, write_set,
    CompiledWrites,
};
