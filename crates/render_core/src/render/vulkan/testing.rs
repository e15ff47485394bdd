//! Recording device used by unit tests
//!
//! Hands out fake handles, counts every create and destroy per object kind,
//! keeps host vectors behind host-visible allocations and logs every recorded
//! command so tests can assert on lifetimes and command streams without a GPU.

use ash::vk;
use ash::vk::Handle;
use slotmap::SlotMap;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::render::vulkan::commands::Command;
use crate::render::vulkan::image::{ImageConfig, SamplerConfig};
use crate::render::vulkan::pipeline::GraphicsPipelineDesc;
use crate::render::vulkan::render_pass::RenderPassDescription;
use crate::render::vulkan::transitions::format_texel_size;
use crate::render::vulkan::{
    AllocationKey, GpuDevice, MemoryUsage, SurfaceFormats, VulkanError, VulkanResult,
};

/// Byte written into row padding of readback images
pub const ROW_PADDING_BYTE: u8 = 0xEE;

/// Kinds of device object tracked by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Buffer,
    Image,
    ImageView,
    Sampler,
    RenderPass,
    Framebuffer,
    DescriptorSetLayout,
    PipelineLayout,
    Pipeline,
    ShaderModule,
}

impl ObjectKind {
    fn create_op(self) -> &'static str {
        match self {
            Self::Buffer => "create buffer",
            Self::Image => "create image",
            Self::ImageView => "create image view",
            Self::Sampler => "create sampler",
            Self::RenderPass => "create render pass",
            Self::Framebuffer => "create framebuffer",
            Self::DescriptorSetLayout => "create descriptor set layout",
            Self::PipelineLayout => "create pipeline layout",
            Self::Pipeline => "create graphics pipeline",
            Self::ShaderModule => "create shader module",
        }
    }
}

/// Framebuffer parameters captured at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferInfo {
    pub render_pass: vk::RenderPass,
    pub attachment_count: usize,
    pub width: u32,
    pub height: u32,
}

#[derive(Default)]
struct State {
    next_handle: u64,
    live: BTreeMap<ObjectKind, HashSet<u64>>,
    created: HashMap<ObjectKind, usize>,
    destroy_order: Vec<ObjectKind>,
    double_frees: usize,
    fail_next: HashSet<ObjectKind>,
    allocations: SlotMap<AllocationKey, Vec<u8>>,
    mapped: HashSet<AllocationKey>,
    images: HashMap<u64, ImageConfig>,
    framebuffers: HashMap<u64, FramebufferInfo>,
    render_pass_attachments: HashMap<u64, usize>,
    pipelines: HashMap<u64, (vk::RenderPass, u32)>,
    commands: Vec<(vk::CommandBuffer, Command)>,
    open_instant: HashSet<u64>,
    instant_submits: usize,
    instant_abandons: usize,
    row_padding: u32,
    no_linear_blit: bool,
}

impl State {
    fn fail(&mut self, kind: ObjectKind) -> VulkanResult<()> {
        if !self.fail_next.remove(&kind) {
            return Ok(());
        }
        let op = kind.create_op();
        Err(match kind {
            ObjectKind::Buffer | ObjectKind::Image => VulkanError::Allocation {
                op,
                result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            },
            _ => VulkanError::Api {
                op,
                result: vk::Result::ERROR_INITIALIZATION_FAILED,
            },
        })
    }

    fn create(&mut self, kind: ObjectKind) -> VulkanResult<u64> {
        self.fail(kind)?;
        self.next_handle += 1;
        let raw = self.next_handle;
        self.live.entry(kind).or_default().insert(raw);
        *self.created.entry(kind).or_default() += 1;
        Ok(raw)
    }

    fn destroy(&mut self, kind: ObjectKind, raw: u64) -> bool {
        if raw == 0 {
            return false;
        }
        let removed = self.live.get_mut(&kind).map_or(false, |set| set.remove(&raw));
        if removed {
            self.destroy_order.push(kind);
        } else {
            self.double_frees += 1;
        }
        removed
    }

    fn free_allocation(&mut self, allocation: AllocationKey) {
        if self.allocations.remove(allocation).is_none() {
            self.double_frees += 1;
        }
        self.mapped.remove(&allocation);
    }
}

/// Recording [`GpuDevice`] for tests
#[derive(Default)]
pub struct MockDevice {
    state: RefCell<State>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live objects of `kind`
    pub fn live(&self, kind: ObjectKind) -> usize {
        self.state.borrow().live.get(&kind).map_or(0, HashSet::len)
    }

    /// Live objects of every kind
    pub fn total_live(&self) -> usize {
        self.state.borrow().live.values().map(HashSet::len).sum()
    }

    /// Objects of `kind` ever created
    pub fn created(&self, kind: ObjectKind) -> usize {
        self.state.borrow().created.get(&kind).copied().unwrap_or(0)
    }

    /// Kinds in the order they were destroyed
    pub fn destroy_order(&self) -> Vec<ObjectKind> {
        self.state.borrow().destroy_order.clone()
    }

    /// Destroy calls on handles or allocations that were not live
    pub fn double_frees(&self) -> usize {
        self.state.borrow().double_frees
    }

    /// Allocations not yet returned
    pub fn live_allocations(&self) -> usize {
        self.state.borrow().allocations.len()
    }

    /// Allocations currently mapped
    pub fn mapped_allocations(&self) -> usize {
        self.state.borrow().mapped.len()
    }

    /// Copy of the host bytes behind `allocation`
    pub fn allocation_contents(&self, allocation: AllocationKey) -> Vec<u8> {
        self.state.borrow().allocations.get(allocation).cloned().unwrap_or_default()
    }

    /// Fail the next creation of `kind`
    pub fn fail_next(&self, kind: ObjectKind) {
        self.state.borrow_mut().fail_next.insert(kind);
    }

    /// Pad every row of linear images by `bytes`
    pub fn set_row_padding(&self, bytes: u32) {
        self.state.borrow_mut().row_padding = bytes;
    }

    /// Report every format as lacking linear-blit support
    pub fn disable_linear_blit(&self) {
        self.state.borrow_mut().no_linear_blit = true;
    }

    /// Every recorded command, in order
    pub fn commands(&self) -> Vec<Command> {
        self.state.borrow().commands.iter().map(|(_, c)| c.clone()).collect()
    }

    /// Commands recorded into `command_buffer`
    pub fn commands_for(&self, command_buffer: vk::CommandBuffer) -> Vec<Command> {
        self.state
            .borrow()
            .commands
            .iter()
            .filter(|(cb, _)| *cb == command_buffer)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Forget recorded commands and the destroy log
    pub fn clear_log(&self) {
        let mut state = self.state.borrow_mut();
        state.commands.clear();
        state.destroy_order.clear();
    }

    /// Instant command buffers submitted
    pub fn instant_submits(&self) -> usize {
        self.state.borrow().instant_submits
    }

    /// Instant command buffers freed without submission
    pub fn instant_abandons(&self) -> usize {
        self.state.borrow().instant_abandons
    }

    /// Instant command buffers begun but not ended
    pub fn open_instant_commands(&self) -> usize {
        self.state.borrow().open_instant.len()
    }

    /// Configs of the live images
    pub fn live_images(&self) -> Vec<ImageConfig> {
        let state = self.state.borrow();
        let live = state.live.get(&ObjectKind::Image);
        state
            .images
            .iter()
            .filter(|(raw, _)| live.map_or(false, |set| set.contains(raw)))
            .map(|(_, config)| *config)
            .collect()
    }

    /// Config an image was created with
    pub fn image_config(&self, image: vk::Image) -> Option<ImageConfig> {
        self.state.borrow().images.get(&image.as_raw()).copied()
    }

    /// Parameters of a live framebuffer
    pub fn framebuffer_info(&self, framebuffer: vk::Framebuffer) -> Option<FramebufferInfo> {
        let state = self.state.borrow();
        let raw = framebuffer.as_raw();
        let live = state
            .live
            .get(&ObjectKind::Framebuffer)
            .map_or(false, |set| set.contains(&raw));
        if live {
            state.framebuffers.get(&raw).copied()
        } else {
            None
        }
    }

    /// Render pass and subpass a pipeline was built against
    pub fn pipeline_target(&self, pipeline: vk::Pipeline) -> Option<(vk::RenderPass, u32)> {
        self.state.borrow().pipelines.get(&pipeline.as_raw()).copied()
    }
}

impl GpuDevice for MockDevice {
    fn surface_formats(&self) -> SurfaceFormats {
        SurfaceFormats {
            color: vk::Format::B8G8R8A8_UNORM,
            depth: vk::Format::D32_SFLOAT_S8_UINT,
        }
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        _usage: vk::BufferUsageFlags,
        memory: MemoryUsage,
    ) -> VulkanResult<(vk::Buffer, AllocationKey)> {
        let mut state = self.state.borrow_mut();
        let raw = state.create(ObjectKind::Buffer)?;
        let bytes = match memory {
            MemoryUsage::DeviceLocal => Vec::new(),
            MemoryUsage::HostUpload | MemoryUsage::HostReadback => vec![0; size as usize],
        };
        let allocation = state.allocations.insert(bytes);
        Ok((vk::Buffer::from_raw(raw), allocation))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer, allocation: AllocationKey) {
        let mut state = self.state.borrow_mut();
        state.destroy(ObjectKind::Buffer, buffer.as_raw());
        state.free_allocation(allocation);
    }

    fn create_image(&self, config: &ImageConfig) -> VulkanResult<(vk::Image, AllocationKey)> {
        let mut state = self.state.borrow_mut();
        let raw = state.create(ObjectKind::Image)?;
        let bytes = if config.memory_usage == MemoryUsage::DeviceLocal {
            Vec::new()
        } else {
            // Rows carry an increasing byte pattern followed by padding.
            let texel = format_texel_size(config.format).unwrap_or(4);
            let row = (config.width * texel) as usize;
            let pitch = row + state.row_padding as usize;
            let mut bytes = vec![ROW_PADDING_BYTE; pitch * config.height as usize];
            for y in 0..config.height as usize {
                bytes[y * pitch..y * pitch + row].fill((y % 251) as u8);
            }
            bytes
        };
        let allocation = state.allocations.insert(bytes);
        state.images.insert(raw, *config);
        Ok((vk::Image::from_raw(raw), allocation))
    }

    fn destroy_image(&self, image: vk::Image, allocation: AllocationKey) {
        let mut state = self.state.borrow_mut();
        state.destroy(ObjectKind::Image, image.as_raw());
        state.free_allocation(allocation);
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        _format: vk::Format,
        _aspect: vk::ImageAspectFlags,
        _mip_levels: u32,
    ) -> VulkanResult<vk::ImageView> {
        let mut state = self.state.borrow_mut();
        let image_live = state
            .live
            .get(&ObjectKind::Image)
            .map_or(false, |set| set.contains(&image.as_raw()));
        if !image_live {
            return Err(VulkanError::invalid("view over a dead image"));
        }
        state.create(ObjectKind::ImageView).map(vk::ImageView::from_raw)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state.borrow_mut().destroy(ObjectKind::ImageView, view.as_raw());
    }

    fn create_sampler(&self, _config: &SamplerConfig) -> VulkanResult<vk::Sampler> {
        self.state.borrow_mut().create(ObjectKind::Sampler).map(vk::Sampler::from_raw)
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.state.borrow_mut().destroy(ObjectKind::Sampler, sampler.as_raw());
    }

    fn map_memory(&self, allocation: AllocationKey) -> VulkanResult<*mut u8> {
        let mut state = self.state.borrow_mut();
        let ptr = match state.allocations.get_mut(allocation) {
            Some(bytes) if !bytes.is_empty() => bytes.as_mut_ptr(),
            Some(_) => return Err(VulkanError::invalid("allocation is not host visible")),
            None => return Err(VulkanError::invalid("map of a freed allocation")),
        };
        state.mapped.insert(allocation);
        Ok(ptr)
    }

    fn unmap_memory(&self, allocation: AllocationKey) {
        self.state.borrow_mut().mapped.remove(&allocation);
    }

    fn image_subresource_layout(
        &self,
        image: vk::Image,
        _aspect: vk::ImageAspectFlags,
    ) -> vk::SubresourceLayout {
        let state = self.state.borrow();
        let config = state.images.get(&image.as_raw()).copied();
        config.map_or_else(vk::SubresourceLayout::default, |config| {
            let texel = format_texel_size(config.format).unwrap_or(4);
            let row_pitch = u64::from(config.width * texel + state.row_padding);
            vk::SubresourceLayout {
                offset: 0,
                size: row_pitch * u64::from(config.height),
                row_pitch,
                array_pitch: 0,
                depth_pitch: 0,
            }
        })
    }

    fn supports_linear_blit(&self, _format: vk::Format) -> bool {
        !self.state.borrow().no_linear_blit
    }

    fn create_render_pass(&self, desc: &RenderPassDescription) -> VulkanResult<vk::RenderPass> {
        let mut state = self.state.borrow_mut();
        let raw = state.create(ObjectKind::RenderPass)?;
        state.render_pass_attachments.insert(raw, desc.attachments.len());
        Ok(vk::RenderPass::from_raw(raw))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state.borrow_mut().destroy(ObjectKind::RenderPass, render_pass.as_raw());
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        width: u32,
        height: u32,
    ) -> VulkanResult<vk::Framebuffer> {
        let mut state = self.state.borrow_mut();
        if state.render_pass_attachments.get(&render_pass.as_raw()) != Some(&attachments.len()) {
            return Err(VulkanError::AttachmentMismatch {
                expected: state
                    .render_pass_attachments
                    .get(&render_pass.as_raw())
                    .copied()
                    .unwrap_or(0),
                actual: attachments.len(),
            });
        }
        let raw = state.create(ObjectKind::Framebuffer)?;
        state.framebuffers.insert(
            raw,
            FramebufferInfo {
                render_pass,
                attachment_count: attachments.len(),
                width,
                height,
            },
        );
        Ok(vk::Framebuffer::from_raw(raw))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state.borrow_mut().destroy(ObjectKind::Framebuffer, framebuffer.as_raw());
    }

    fn create_descriptor_set_layout(
        &self,
        _bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> VulkanResult<vk::DescriptorSetLayout> {
        self.state
            .borrow_mut()
            .create(ObjectKind::DescriptorSetLayout)
            .map(vk::DescriptorSetLayout::from_raw)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.state
            .borrow_mut()
            .destroy(ObjectKind::DescriptorSetLayout, layout.as_raw());
    }

    fn create_pipeline_layout(
        &self,
        _set_layouts: &[vk::DescriptorSetLayout],
        _push_constant_ranges: &[vk::PushConstantRange],
    ) -> VulkanResult<vk::PipelineLayout> {
        self.state
            .borrow_mut()
            .create(ObjectKind::PipelineLayout)
            .map(vk::PipelineLayout::from_raw)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.state.borrow_mut().destroy(ObjectKind::PipelineLayout, layout.as_raw());
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> VulkanResult<vk::Pipeline> {
        let mut state = self.state.borrow_mut();
        let raw = state.create(ObjectKind::Pipeline)?;
        state.pipelines.insert(raw, (desc.render_pass, desc.subpass));
        Ok(vk::Pipeline::from_raw(raw))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.state.borrow_mut().destroy(ObjectKind::Pipeline, pipeline.as_raw());
    }

    fn create_shader_module(&self, _code: &[u32]) -> VulkanResult<vk::ShaderModule> {
        self.state
            .borrow_mut()
            .create(ObjectKind::ShaderModule)
            .map(vk::ShaderModule::from_raw)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.state.borrow_mut().destroy(ObjectKind::ShaderModule, module.as_raw());
    }

    fn begin_instant_commands(&self) -> VulkanResult<vk::CommandBuffer> {
        let mut state = self.state.borrow_mut();
        state.next_handle += 1;
        let raw = state.next_handle;
        state.open_instant.insert(raw);
        Ok(vk::CommandBuffer::from_raw(raw))
    }

    fn end_instant_commands(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let mut state = self.state.borrow_mut();
        if !state.open_instant.remove(&command_buffer.as_raw()) {
            return Err(VulkanError::invalid("end of an instant command buffer that was never begun"));
        }
        state.instant_submits += 1;
        Ok(())
    }

    fn abandon_instant_commands(&self, command_buffer: vk::CommandBuffer) {
        let mut state = self.state.borrow_mut();
        if state.open_instant.remove(&command_buffer.as_raw()) {
            state.instant_abandons += 1;
        }
    }

    fn record(&self, command_buffer: vk::CommandBuffer, command: &Command) {
        self.state
            .borrow_mut()
            .commands
            .push((command_buffer, command.clone()));
    }
}
