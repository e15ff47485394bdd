//! Vulkan device context backed by ash and the Vulkan Memory Allocator
//!
//! [`VulkanDevice`] owns the instance, logical device, graphics queue, memory
//! allocator, a transient command pool for instant commands and a pipeline
//! cache. It is created once at application start and shared as a
//! [`DeviceRef`](crate::render::vulkan::DeviceRef).

use ash::extensions::ext::DebugUtils;
use ash::{vk, Device, Entry, Instance};
use slotmap::SlotMap;
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use vk_mem::Alloc;

use crate::render::vulkan::commands::Command;
use crate::render::vulkan::image::{ImageConfig, SamplerConfig};
use crate::render::vulkan::pipeline::GraphicsPipelineDesc;
use crate::render::vulkan::render_pass::RenderPassDescription;
use crate::render::vulkan::{
    AllocationKey, GpuDevice, MemoryUsage, SurfaceFormats, VulkanError, VulkanResult,
};

const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Depth formats tried in order of preference
const DEPTH_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D32_SFLOAT,
];

/// Production device context
pub struct VulkanDevice {
    _entry: Entry,
    instance: Instance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    physical_device: vk::PhysicalDevice,
    device: Device,
    queue: vk::Queue,
    allocator: ManuallyDrop<vk_mem::Allocator>,
    allocations: RefCell<SlotMap<AllocationKey, vk_mem::Allocation>>,
    command_pool: vk::CommandPool,
    pipeline_cache: vk::PipelineCache,
    surface_formats: SurfaceFormats,
}

impl VulkanDevice {
    /// Create a device context without a presentation surface
    ///
    /// Picks the first discrete GPU with a graphics queue, falling back to any
    /// device with one. The color format defaults to `B8G8R8A8_UNORM`.
    pub fn new_headless(app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e)))?;

        let app_name_cstr = CString::new(app_name)
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid application name: {}", e)))?;
        let engine_name_cstr = CString::new("render_core")
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_2);

        let validation = enable_validation && Self::validation_layer_available(&entry);
        if enable_validation && !validation {
            log::warn!("{} requested but not installed, continuing without it", VALIDATION_LAYER);
        }
        let layer_names = if validation {
            vec![CString::new(VALIDATION_LAYER).map_err(|e| VulkanError::InitializationFailed(e.to_string()))?]
        } else {
            Vec::new()
        };
        let layer_ptrs: Vec<_> = layer_names.iter().map(|name| name.as_ptr()).collect();
        let extension_ptrs = if validation {
            vec![DebugUtils::name().as_ptr()]
        } else {
            Vec::new()
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);
        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(VulkanError::api("create instance"))?;

        let debug = if validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let messenger_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
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
                .pfn_user_callback(Some(debug_callback));
            let messenger = unsafe { debug_utils.create_debug_utils_messenger(&messenger_info, None) }
                .map_err(VulkanError::api("create debug messenger"))?;
            Some((debug_utils, messenger))
        } else {
            None
        };

        let (physical_device, queue_family) = Self::select_physical_device(&instance)?;
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
        log::info!("Using GPU: {}", device_name.to_string_lossy());

        let priorities = [1.0];
        let queue_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family)
            .queue_priorities(&priorities)
            .build();
        let queue_infos = [queue_info];
        let device_info = vk::DeviceCreateInfo::builder().queue_create_infos(&queue_infos);
        let device = unsafe { instance.create_device(physical_device, &device_info, None) }
            .map_err(VulkanError::api("create device"))?;
        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        let allocator = vk_mem::Allocator::new(vk_mem::AllocatorCreateInfo::new(&instance, &device, physical_device))
            .map_err(VulkanError::allocation("create allocator"))?;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .map_err(VulkanError::api("create command pool"))?;

        let cache_info = vk::PipelineCacheCreateInfo::builder();
        let pipeline_cache = unsafe { device.create_pipeline_cache(&cache_info, None) }
            .map_err(VulkanError::api("create pipeline cache"))?;

        let depth = DEPTH_CANDIDATES
            .iter()
            .copied()
            .find(|&format| {
                let props = unsafe { instance.get_physical_device_format_properties(physical_device, format) };
                props
                    .optimal_tiling_features
                    .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            })
            .ok_or_else(|| VulkanError::InitializationFailed("no supported depth format".to_string()))?;

        log::debug!("Headless device ready, depth format {:?}", depth);

        Ok(Self {
            _entry: entry,
            instance,
            debug,
            physical_device,
            device,
            queue,
            allocator: ManuallyDrop::new(allocator),
            allocations: RefCell::new(SlotMap::with_key()),
            command_pool,
            pipeline_cache,
            surface_formats: SurfaceFormats {
                color: vk::Format::B8G8R8A8_UNORM,
                depth,
            },
        })
    }

    /// Logical device
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(VulkanError::api("wait for device idle"))
    }

    fn validation_layer_available(entry: &Entry) -> bool {
        entry
            .enumerate_instance_layer_properties()
            .map(|layers| {
                layers.iter().any(|layer| {
                    let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
                    name.to_bytes() == VALIDATION_LAYER.as_bytes()
                })
            })
            .unwrap_or(false)
    }

    fn select_physical_device(instance: &Instance) -> VulkanResult<(vk::PhysicalDevice, u32)> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(VulkanError::api("enumerate physical devices"))?;

        let mut fallback = None;
        for physical_device in devices {
            let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
            let Some(family) = families
                .iter()
                .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            else {
                continue;
            };
            let properties = unsafe { instance.get_physical_device_properties(physical_device) };
            if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
                return Ok((physical_device, family as u32));
            }
            fallback.get_or_insert((physical_device, family as u32));
        }

        fallback.ok_or_else(|| VulkanError::InitializationFailed("no GPU with a graphics queue".to_string()))
    }

    fn allocation_info(memory: MemoryUsage) -> vk_mem::AllocationCreateInfo {
        let (usage, flags) = match memory {
            MemoryUsage::DeviceLocal => (vk_mem::MemoryUsage::AutoPreferDevice, vk_mem::AllocationCreateFlags::empty()),
            MemoryUsage::HostUpload => (
                vk_mem::MemoryUsage::AutoPreferHost,
                vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
            ),
            MemoryUsage::HostReadback => (
                vk_mem::MemoryUsage::AutoPreferHost,
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM,
            ),
        };
        vk_mem::AllocationCreateInfo {
            usage,
            flags,
            ..Default::default()
        }
    }

    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.free_command_buffers(self.command_pool, &[command_buffer]) };
    }

    fn submit_and_wait(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        unsafe { self.device.end_command_buffer(command_buffer) }
            .map_err(VulkanError::api("end instant command buffer"))?;

        let fence = unsafe { self.device.create_fence(&vk::FenceCreateInfo::builder(), None) }
            .map_err(VulkanError::api("create fence"))?;
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();
        let result = unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info], fence)
                .map_err(VulkanError::api("submit instant commands"))
                .and_then(|_| {
                    self.device
                        .wait_for_fences(&[fence], true, u64::MAX)
                        .map_err(VulkanError::api("wait for instant commands"))
                })
        };
        unsafe { self.device.destroy_fence(fence, None) };
        result
    }
}

impl GpuDevice for VulkanDevice {
    fn surface_formats(&self) -> SurfaceFormats {
        self.surface_formats
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory: MemoryUsage,
    ) -> VulkanResult<(vk::Buffer, AllocationKey)> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let (buffer, allocation) = unsafe { self.allocator.create_buffer(&buffer_info, &Self::allocation_info(memory)) }
            .map_err(VulkanError::allocation("create buffer"))?;
        let key = self.allocations.borrow_mut().insert(allocation);
        Ok((buffer, key))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer, allocation: AllocationKey) {
        match self.allocations.borrow_mut().remove(allocation) {
            Some(mut allocation) => unsafe { self.allocator.destroy_buffer(buffer, &mut allocation) },
            None => log::error!("Buffer {:?} released with an unknown allocation", buffer),
        }
    }

    fn create_image(&self, config: &ImageConfig) -> VulkanResult<(vk::Image, AllocationKey)> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: config.width,
                height: config.height,
                depth: 1,
            })
            .mip_levels(config.mip_levels)
            .array_layers(1)
            .format(config.format)
            .tiling(config.tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(config.usage)
            .samples(config.sample_count)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let (image, allocation) =
            unsafe { self.allocator.create_image(&image_info, &Self::allocation_info(config.memory_usage)) }
                .map_err(VulkanError::allocation("create image"))?;
        let key = self.allocations.borrow_mut().insert(allocation);
        Ok((image, key))
    }

    fn destroy_image(&self, image: vk::Image, allocation: AllocationKey) {
        match self.allocations.borrow_mut().remove(allocation) {
            Some(mut allocation) => unsafe { self.allocator.destroy_image(image, &mut allocation) },
            None => log::error!("Image {:?} released with an unknown allocation", image),
        }
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        mip_levels: u32,
    ) -> VulkanResult<vk::ImageView> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });
        unsafe { self.device.create_image_view(&view_info, None) }.map_err(VulkanError::api("create image view"))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) };
    }

    fn create_sampler(&self, config: &SamplerConfig) -> VulkanResult<vk::Sampler> {
        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(config.mag_filter)
            .min_filter(config.min_filter)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(config.address_mode_u)
            .address_mode_v(config.address_mode_v)
            .address_mode_w(config.address_mode_w)
            .mip_lod_bias(0.0)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .compare_enable(false)
            .compare_op(vk::CompareOp::NEVER)
            .min_lod(0.0)
            .max_lod(config.mip_levels as f32)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false);
        unsafe { self.device.create_sampler(&sampler_info, None) }.map_err(VulkanError::api("create sampler"))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) };
    }

    fn map_memory(&self, allocation: AllocationKey) -> VulkanResult<*mut u8> {
        let mut allocations = self.allocations.borrow_mut();
        let allocation = allocations
            .get_mut(allocation)
            .ok_or_else(|| VulkanError::invalid("map of an unknown allocation"))?;
        unsafe { self.allocator.map_memory(allocation) }.map_err(VulkanError::allocation("map memory"))
    }

    fn unmap_memory(&self, allocation: AllocationKey) {
        if let Some(allocation) = self.allocations.borrow_mut().get_mut(allocation) {
            unsafe { self.allocator.unmap_memory(allocation) };
        }
    }

    fn image_subresource_layout(&self, image: vk::Image, aspect: vk::ImageAspectFlags) -> vk::SubresourceLayout {
        let subresource = vk::ImageSubresource {
            aspect_mask: aspect,
            mip_level: 0,
            array_layer: 0,
        };
        unsafe { self.device.get_image_subresource_layout(image, subresource) }
    }

    fn supports_linear_blit(&self, format: vk::Format) -> bool {
        let props = unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        };
        props
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    }

    fn create_render_pass(&self, desc: &RenderPassDescription) -> VulkanResult<vk::RenderPass> {
        let subpasses: Vec<vk::SubpassDescription> = desc
            .subpasses
            .iter()
            .map(|subpass| {
                let builder = vk::SubpassDescription::builder()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .color_attachments(&subpass.color_attachments);
                match &subpass.depth_stencil_attachment {
                    Some(depth) => builder.depth_stencil_attachment(depth).build(),
                    None => builder.build(),
                }
            })
            .collect();
        let render_pass_info = vk::RenderPassCreateInfo::builder()
            .attachments(&desc.attachments)
            .subpasses(&subpasses)
            .dependencies(&desc.dependencies);
        unsafe { self.device.create_render_pass(&render_pass_info, None) }
            .map_err(VulkanError::api("create render pass"))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) };
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        width: u32,
        height: u32,
    ) -> VulkanResult<vk::Framebuffer> {
        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(width)
            .height(height)
            .layers(1);
        unsafe { self.device.create_framebuffer(&framebuffer_info, None) }
            .map_err(VulkanError::api("create framebuffer"))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) };
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> VulkanResult<vk::DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);
        unsafe { self.device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(VulkanError::api("create descriptor set layout"))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) };
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> VulkanResult<vk::PipelineLayout> {
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);
        unsafe { self.device.create_pipeline_layout(&layout_info, None) }
            .map_err(VulkanError::api("create pipeline layout"))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) };
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> VulkanResult<vk::Pipeline> {
        let entry = CStr::from_bytes_with_nul(b"main\0")
            .map_err(|e| VulkanError::Shader(format!("invalid entry point: {}", e)))?;
        let stages: Vec<_> = desc
            .stages
            .iter()
            .map(|stage| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(stage.stage)
                    .module(stage.module)
                    .name(entry)
                    .build()
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&desc.vertex_bindings)
            .vertex_attribute_descriptions(&desc.vertex_attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(desc.topology)
            .primitive_restart_enable(false);
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);
        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(desc.polygon_mode)
            .line_width(1.0)
            .cull_mode(desc.cull_mode)
            .front_face(desc.front_face)
            .depth_bias_enable(false);
        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(desc.sample_count);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(desc.depth_test)
            .depth_write_enable(desc.depth_write)
            .depth_compare_op(desc.depth_compare_op)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(desc.blend_enable)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .build();
        let blend_attachments = vec![blend_attachment; desc.color_attachment_count as usize];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments);
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&desc.dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(desc.layout)
            .render_pass(desc.render_pass)
            .subpass(desc.subpass)
            .build();

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(self.pipeline_cache, &[pipeline_info], None)
        }
        .map_err(|(_, result)| VulkanError::Api {
            op: "create graphics pipeline",
            result,
        })?;
        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::invalid("pipeline creation returned no pipeline"))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) };
    }

    fn create_shader_module(&self, code: &[u32]) -> VulkanResult<vk::ShaderModule> {
        let module_info = vk::ShaderModuleCreateInfo::builder().code(code);
        unsafe { self.device.create_shader_module(&module_info, None) }
            .map_err(VulkanError::api("create shader module"))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) };
    }

    fn begin_instant_commands(&self) -> VulkanResult<vk::CommandBuffer> {
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_pool(self.command_pool)
            .command_buffer_count(1);
        let command_buffer = unsafe { self.device.allocate_command_buffers(&allocate_info) }
            .map_err(VulkanError::api("allocate instant command buffer"))?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::invalid("no command buffer allocated"))?;

        let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        if let Err(result) = unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) } {
            self.free_command_buffer(command_buffer);
            return Err(VulkanError::Api {
                op: "begin instant command buffer",
                result,
            });
        }
        Ok(command_buffer)
    }

    fn end_instant_commands(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let result = self.submit_and_wait(command_buffer);
        self.free_command_buffer(command_buffer);
        result
    }

    fn abandon_instant_commands(&self, command_buffer: vk::CommandBuffer) {
        self.free_command_buffer(command_buffer);
    }

    fn record(&self, cb: vk::CommandBuffer, command: &Command) {
        let device = &self.device;
        unsafe {
            match command {
                Command::BeginRenderPass {
                    render_pass,
                    framebuffer,
                    extent,
                    clear_values,
                } => {
                    let clear_values: Vec<vk::ClearValue> = clear_values.iter().map(|c| c.to_vk()).collect();
                    let begin_info = vk::RenderPassBeginInfo::builder()
                        .render_pass(*render_pass)
                        .framebuffer(*framebuffer)
                        .render_area(vk::Rect2D {
                            offset: vk::Offset2D { x: 0, y: 0 },
                            extent: *extent,
                        })
                        .clear_values(&clear_values);
                    device.cmd_begin_render_pass(cb, &begin_info, vk::SubpassContents::INLINE);
                }
                Command::EndRenderPass => device.cmd_end_render_pass(cb),
                Command::SetViewport(viewport) => device.cmd_set_viewport(cb, 0, &[*viewport]),
                Command::SetScissor(scissor) => device.cmd_set_scissor(cb, 0, &[*scissor]),
                Command::BindPipeline(pipeline) => {
                    device.cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, *pipeline)
                }
                Command::Draw {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                } => device.cmd_draw(cb, *vertex_count, *instance_count, *first_vertex, *first_instance),
                Command::PipelineBarrier {
                    src_stage,
                    dst_stage,
                    image_barriers,
                } => {
                    let barriers: Vec<vk::ImageMemoryBarrier> = image_barriers.iter().map(|b| b.to_vk()).collect();
                    device.cmd_pipeline_barrier(
                        cb,
                        *src_stage,
                        *dst_stage,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &barriers,
                    );
                }
                Command::CopyBuffer { src, dst, regions } => device.cmd_copy_buffer(cb, *src, *dst, regions),
                Command::CopyBufferToImage { src, dst, regions } => device.cmd_copy_buffer_to_image(
                    cb,
                    *src,
                    *dst,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    regions,
                ),
                Command::CopyImage { src, dst, regions } => device.cmd_copy_image(
                    cb,
                    *src,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    *dst,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    regions,
                ),
                Command::BlitImage {
                    src,
                    dst,
                    regions,
                    filter,
                } => device.cmd_blit_image(
                    cb,
                    *src,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    *dst,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    regions,
                    *filter,
                ),
            }
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            teardown_step("wait for device idle", self.device.device_wait_idle());

            let leaked = self.allocations.get_mut();
            if !leaked.is_empty() {
                log::warn!("{} device allocations still live at shutdown", leaked.len());
                for (_, mut allocation) in leaked.drain() {
                    self.allocator.free_memory(&mut allocation);
                }
            }

            self.device.destroy_pipeline_cache(self.pipeline_cache, None);
            self.device.destroy_command_pool(self.command_pool, None);
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);

            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        log::debug!("Vulkan device destroyed");
    }
}

/// Log a failed teardown call; teardown continues either way
fn teardown_step(op: &str, result: Result<(), vk::Result>) -> bool {
    match result {
        Ok(()) => true,
        Err(result) => {
            log::warn!("failed to {} during teardown, error: {:?}", op, result);
            false
        }
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}
