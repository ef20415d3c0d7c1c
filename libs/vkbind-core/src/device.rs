use std::{
    borrow::Cow,
    ffi::{c_char, CStr},
    process::id,
    sync::Mutex,
    thread::{current, park},
};

use ash::extensions::ext::DebugUtils;
use ash::prelude::VkResult;
use ash::vk;
use gpu_allocator::{
    vulkan::{Allocator, AllocatorCreateDesc},
    AllocatorDebugSettings,
};
use log::{debug, error, info, logger, trace, warn};

/// The native entry points the binding core calls into. Everything else in
/// the crate talks to the device through this seam.
pub trait DescriptorDevice {
    fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> VkResult<vk::DescriptorSetLayout>;

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo,
    ) -> VkResult<vk::DescriptorPool>;

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()>;

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        variable_count: Option<u32>,
    ) -> VkResult<vk::DescriptorSet>;

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]);
}

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let callback_data = *p_callback_data;

    let message = if callback_data.p_message.is_null() {
        Cow::from("")
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            info!("{message}");
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            warn!("{message}");
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            error!("{message}");
            debug!(
                "parking thread `{}` -> attach debugger to pid {}!",
                current().name().unwrap_or_default(),
                id()
            );

            logger().flush();

            park();
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
            trace!("{message}");
        }
        _ => {}
    }

    vk::FALSE
}

pub struct Device {
    pub device: ash::Device,
    pub instance: ash::Instance,
    pub debug_loader: DebugUtils,
    pub debug_callback: vk::DebugUtilsMessengerEXT,
    pub allocator: Option<Mutex<Allocator>>,
    pub queue_family_index: u32,
    pub queue: vk::Queue,
}

impl Device {
    pub fn create() -> Self {
        unsafe {
            let entry = ash::Entry::linked();
            let app_name = CStr::from_bytes_with_nul_unchecked(b"vkbind\0");

            let layer_names = [CStr::from_bytes_with_nul_unchecked(
                b"VK_LAYER_KHRONOS_validation\0",
            )];
            let layers_names_raw: Vec<*const c_char> = layer_names
                .iter()
                .map(|raw_name| raw_name.as_ptr())
                .collect();

            let extensions = [DebugUtils::name().as_ptr()];

            let appinfo = vk::ApplicationInfo::builder()
                .application_name(app_name)
                .application_version(0)
                .engine_name(app_name)
                .engine_version(0)
                .api_version(vk::API_VERSION_1_3);

            let create_info = vk::InstanceCreateInfo::builder()
                .application_info(&appinfo)
                .enabled_layer_names(&layers_names_raw)
                .enabled_extension_names(&extensions);

            let instance = entry
                .create_instance(&create_info, None)
                .expect("Could not create instance!");

            let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(vulkan_debug_callback));

            let debug_loader = DebugUtils::new(&entry, &instance);
            let debug_callback = debug_loader
                .create_debug_utils_messenger(&debug_info, None)
                .unwrap();

            let pdevices = instance
                .enumerate_physical_devices()
                .expect("No physical device found!");

            let (pdevice, queue_family_index) = pdevices
                .iter()
                .filter_map(|pdevice| {
                    instance
                        .get_physical_device_queue_family_properties(*pdevice)
                        .iter()
                        .enumerate()
                        .find_map(|(index, info)| {
                            info.queue_flags
                                .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
                                .then_some((*pdevice, index))
                        })
                })
                .max_by_key(|(pdevice, _)| {
                    let ty = instance
                        .get_physical_device_properties(*pdevice)
                        .device_type;
                    match ty {
                        vk::PhysicalDeviceType::CPU => 1,
                        vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
                        vk::PhysicalDeviceType::DISCRETE_GPU => 3,
                        _ => 0,
                    }
                })
                .unwrap();

            let properties = instance.get_physical_device_properties(pdevice);
            trace!(
                "Found physical device: {:?}",
                CStr::from_bytes_until_nul(std::mem::transmute(properties.device_name.as_ref()))
                    .unwrap()
            );

            let queue_family_index = queue_family_index as u32;

            let priorities = [1.0];

            let queue_info = vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(queue_family_index)
                .queue_priorities(&priorities);

            let mut vulkan_1_2_features = vk::PhysicalDeviceVulkan12Features::builder();
            let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::builder();

            let features2 = vk::PhysicalDeviceFeatures2::builder()
                .push_next(&mut vulkan_1_2_features)
                .push_next(&mut vulkan_1_3_features);

            let mut features2 = features2.build();

            instance.get_physical_device_features2(pdevice, &mut features2);

            // Testing if required features are enabled
            if vulkan_1_2_features.descriptor_indexing != vk::TRUE
                || vulkan_1_2_features.descriptor_binding_variable_descriptor_count != vk::TRUE
                || vulkan_1_2_features.descriptor_binding_partially_bound != vk::TRUE
                || vulkan_1_2_features.descriptor_binding_sampled_image_update_after_bind
                    != vk::TRUE
            {
                error!("Descriptor indexing could not be enabled!");
                panic!();
            }
            if vulkan_1_3_features.synchronization2 != vk::TRUE {
                error!("Synchronization2 could not be enabled!");
                panic!();
            }

            let device_create_info = vk::DeviceCreateInfo::builder()
                .queue_create_infos(std::slice::from_ref(&queue_info))
                .push_next(&mut features2);

            let device = instance
                .create_device(pdevice, &device_create_info, None)
                .unwrap();

            let queue = device.get_device_queue(queue_family_index, 0);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device: pdevice,
                debug_settings: AllocatorDebugSettings {
                    log_leaks_on_shutdown: true,
                    ..Default::default()
                },
                buffer_device_address: false,
            })
            .unwrap();
            let allocator = Some(Mutex::new(allocator));
            Self {
                device,
                instance,
                debug_loader,
                debug_callback,
                allocator,
                queue_family_index,
                queue,
            }
        }
    }
}

impl DescriptorDevice for Device {
    fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> VkResult<vk::DescriptorSetLayout> {
        unsafe { self.device.create_descriptor_set_layout(info, None) }
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo,
    ) -> VkResult<vk::DescriptorPool> {
        unsafe { self.device.create_descriptor_pool(info, None) }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
        unsafe {
            self.device
                .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
        }
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        variable_count: Option<u32>,
    ) -> VkResult<vk::DescriptorSet> {
        let layouts = [layout];
        let counts;
        let mut count_info;

        let mut info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        if let Some(count) = variable_count {
            counts = [count];
            count_info = vk::DescriptorSetVariableDescriptorCountAllocateInfo::builder()
                .descriptor_counts(&counts);
            info = info.push_next(&mut count_info);
        }

        let sets = unsafe { self.device.allocate_descriptor_sets(&info)? };
        Ok(sets[0])
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        unsafe { self.device.update_descriptor_sets(writes, &[]) }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().unwrap();
            self.allocator.take();
            self.device.destroy_device(None);
            self.debug_loader
                .destroy_debug_utils_messenger(self.debug_callback, None);
            self.instance.destroy_instance(None);
            trace!("Dropped device.");
        }
    }
}
