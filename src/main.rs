use std::sync::Arc;

use ash::vk;
use log::info;

use vkbind_core::{
    write_set, BarrierPolicy, Binding, Buffer, BufferBinding, BufferInfo, DescriptorSetInfo,
    Device, DynamicDescriptorPool, FrameCounter, Image, ImageBinding, ImageInfo, LayoutCache,
    ReflectedBinding,
};

fn main() {
    pretty_env_logger::init();

    let device = Arc::new(Device::create());
    let frames = Arc::new(FrameCounter::new(2));
    let mut layouts = LayoutCache::new();
    let pool = DynamicDescriptorPool::new(device.clone(), frames.clone());

    // the same set as two shader stages see it
    let mut vertex = DescriptorSetInfo::new();
    vertex.parse_stage(
        vk::ShaderStageFlags::VERTEX,
        &[ReflectedBinding {
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            array_dims: vec![],
        }],
    );
    let mut fragment = DescriptorSetInfo::new();
    fragment.parse_stage(
        vk::ShaderStageFlags::FRAGMENT,
        &[
            ReflectedBinding {
                binding: 0,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                array_dims: vec![],
            },
            ReflectedBinding {
                binding: 1,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                array_dims: vec![],
            },
        ],
    );

    let mut merged = vertex.clone();
    merged.merge(&fragment);

    let (layout_id, _) = layouts.register_or_get(device.as_ref(), &merged);
    let (again, _) = layouts.register_or_get(device.as_ref(), &merged);
    assert_eq!(layout_id, again);
    info!("layout {:?} registered once for two stages", layout_id);

    let mut buffer = Buffer::create(
        &device,
        BufferInfo {
            size: 64,
            usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
            alignment: 16,
            mappable: true,
        },
    );
    buffer.upload(&[1.0f32; 16]);

    let image = Arc::new(Image::create(
        &device,
        ImageInfo {
            extent: vk::Extent3D {
                width: 4,
                height: 4,
                depth: 1,
            },
            format: vk::Format::R8G8B8A8_UNORM,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        },
    ));
    let sampler = unsafe {
        device
            .device
            .create_sampler(&vk::SamplerCreateInfo::default(), None)
            .unwrap()
    };

    unsafe {
        let cmd_pool_info =
            vk::CommandPoolCreateInfo::builder().queue_family_index(device.queue_family_index);
        let cmd_pool = device.device.create_command_pool(&cmd_pool_info, None).unwrap();

        let cmd_buf_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(cmd_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd_buffer = device.device.allocate_command_buffers(&cmd_buf_info).unwrap()[0];

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device.device.begin_command_buffer(cmd_buffer, &begin_info).unwrap();

        pool.begin_frame();
        let set = pool.allocate(
            &layouts,
            layout_id,
            vec![
                Binding::buffer(
                    0,
                    BufferBinding {
                        descriptor_info: buffer.descriptor_info(),
                    },
                ),
                Binding::image(
                    1,
                    ImageBinding::new(
                        image.clone(),
                        vk::DescriptorImageInfo {
                            sampler,
                            ..image.descriptor_info(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                        },
                    ),
                ),
            ],
            cmd_buffer,
            BarrierPolicy::Auto,
        );

        write_set(device.as_ref(), &layouts, &pool, &set);
        set.process_barriers(&layouts);

        device.device.end_command_buffer(cmd_buffer).unwrap();

        let cmd_buffers = [cmd_buffer];
        let submit = vk::SubmitInfo::builder().command_buffers(&cmd_buffers).build();
        device
            .device
            .queue_submit(device.queue, &[submit], vk::Fence::null())
            .unwrap();
        device.device.device_wait_idle().unwrap();

        info!("wrote set {:?}", set.vk_set());

        device.device.destroy_command_pool(cmd_pool, None);
        device.device.destroy_sampler(sampler, None);
    }

    pool.reset_all();
    layouts.clear(device.as_ref());
}
