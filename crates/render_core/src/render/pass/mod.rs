//! Render pass lifecycle
//!
//! Every pass follows the same sequence:
//!
//! ```text
//! Uninitialized --init--> Initialized --prepare--> Prepared --record--> Recorded
//!                                                     ^                    |
//!                                                     +------prepare-------+
//! (any live state) --destroy--> Destroyed
//! ```
//!
//! Resizable objects (render targets and framebuffers) live beside that
//! sequence: they are created after `init`, destroyed and recreated on every
//! resize, and must exist for `prepare` and `record`. Shared state lives in a
//! [`PassBase`] composed into each concrete pass.

pub mod base_pass;
pub mod brdf_lut_pass;

pub use base_pass::BasePass;
pub use brdf_lut_pass::BrdfLutPass;

use ash::vk;
use std::fmt;

use crate::render::vulkan::{
    ActiveRenderPass, ClearValue, CommandRecorder, DescriptorSetLayout, DeviceRef, Framebuffer, ImageView,
    Pipeline, PipelineLayout, RenderPassHandle, VulkanError, VulkanResult,
};

/// Lifecycle state of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    /// Constructed, nothing created yet
    Uninitialized,
    /// Render pass and fixed pipeline objects exist
    Initialized,
    /// Per-frame state refreshed, ready to record
    Prepared,
    /// Commands recorded for the current frame
    Recorded,
    /// Every handle released; the pass is unusable
    Destroyed,
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Per-frame recording target handed out by the swapchain owner
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    /// Command buffer in the recording state
    pub command_buffer: vk::CommandBuffer,
    /// Index of the frame in flight
    pub frame_index: usize,
}

/// State shared by every pass
///
/// Fixed objects (render pass, layouts, pipelines) are created once by `init`
/// and released by [`PassBase::destroy`]. The framebuffer is a resizable
/// object and is released by [`PassBase::destroy_resizable_objects`].
pub struct PassBase {
    /// Device context
    pub device: DeviceRef,
    /// Render pass, present after `init`
    pub render_pass: Option<RenderPassHandle>,
    /// Framebuffer of the current size
    pub framebuffer: Option<Framebuffer>,
    /// Descriptor set layouts
    pub descriptor_set_layouts: Vec<DescriptorSetLayout>,
    /// Pipeline layouts
    pub pipeline_layouts: Vec<PipelineLayout>,
    /// Pipelines, built against `render_pass`
    pub pipelines: Vec<Pipeline>,
    /// Current width
    pub width: u32,
    /// Current height
    pub height: u32,
    name: &'static str,
    state: PassState,
    resizable_valid: bool,
}

impl PassBase {
    /// Empty base for a pass called `name`
    pub fn new(device: &DeviceRef, name: &'static str) -> Self {
        Self {
            device: device.clone(),
            render_pass: None,
            framebuffer: None,
            descriptor_set_layouts: Vec::new(),
            pipeline_layouts: Vec::new(),
            pipelines: Vec::new(),
            width: 0,
            height: 0,
            name,
            state: PassState::Uninitialized,
            resizable_valid: false,
        }
    }

    /// Pass name used in logs and errors
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Lifecycle state
    pub fn state(&self) -> PassState {
        self.state
    }

    /// Whether render targets and framebuffer exist for the current size
    pub fn resizable_objects_valid(&self) -> bool {
        self.resizable_valid
    }

    /// Current extent
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    fn misuse(&self, op: &str) -> VulkanError {
        VulkanError::invalid(format!("{}: cannot {} in state {}", self.name, op, self.state))
    }

    /// Check that `init` may run
    pub fn begin_init(&self) -> VulkanResult<()> {
        if self.state != PassState::Uninitialized {
            return Err(self.misuse("init"));
        }
        Ok(())
    }

    /// Mark `init` as done
    pub fn finish_init(&mut self) {
        self.state = PassState::Initialized;
        log::debug!("{}: initialized", self.name);
    }

    /// Move to `Prepared`; repeated calls within a frame are accepted
    pub fn mark_prepared(&mut self) -> VulkanResult<()> {
        match self.state {
            PassState::Initialized | PassState::Prepared | PassState::Recorded if self.resizable_valid => {
                self.state = PassState::Prepared;
                Ok(())
            }
            _ if !self.resizable_valid && self.is_live() => Err(VulkanError::invalid(format!(
                "{}: cannot prepare without resizable objects",
                self.name
            ))),
            _ => Err(self.misuse("prepare")),
        }
    }

    /// Check that commands may be recorded
    pub fn begin_record(&self) -> VulkanResult<()> {
        if self.state != PassState::Prepared {
            return Err(self.misuse("record"));
        }
        if !self.resizable_valid {
            return Err(VulkanError::invalid(format!(
                "{}: cannot record without resizable objects",
                self.name
            )));
        }
        Ok(())
    }

    /// Mark recording as done
    pub fn finish_record(&mut self) {
        self.state = PassState::Recorded;
    }

    /// Check that resizable objects may be created at `width` x `height`
    pub fn begin_create_resizable(&self, width: u32, height: u32) -> VulkanResult<()> {
        if !self.is_live() || self.state == PassState::Uninitialized {
            return Err(self.misuse("create resizable objects"));
        }
        if self.resizable_valid {
            return Err(VulkanError::invalid(format!(
                "{}: resizable objects already exist",
                self.name
            )));
        }
        if width == 0 || height == 0 {
            return Err(VulkanError::invalid(format!(
                "{}: zero extent {}x{}",
                self.name, width, height
            )));
        }
        Ok(())
    }

    /// Record the new size once every resizable object exists
    pub fn finish_create_resizable(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.resizable_valid = true;
        log::debug!("{}: resizable objects created at {}x{}", self.name, width, height);
    }

    /// Render pass, or an error before `init`
    pub fn render_pass(&self) -> VulkanResult<&RenderPassHandle> {
        self.render_pass
            .as_ref()
            .ok_or_else(|| VulkanError::invalid(format!("{}: render pass not created", self.name)))
    }

    /// Bind `attachments` into a framebuffer at `width` x `height`
    pub fn create_framebuffer(&mut self, attachments: &[&ImageView], width: u32, height: u32) -> VulkanResult<()> {
        let extent = vk::Extent2D { width, height };
        let framebuffer = Framebuffer::new(&self.device, self.render_pass()?, attachments, extent)?;
        self.framebuffer = Some(framebuffer);
        Ok(())
    }

    /// Begin the render pass on `recorder` with viewport and scissor covering the pass
    pub fn begin<'r, 'a>(
        &self,
        recorder: &'r mut CommandRecorder<'a>,
        clear_values: &[ClearValue],
    ) -> VulkanResult<ActiveRenderPass<'r, 'a>> {
        let render_pass = self.render_pass()?.handle();
        let framebuffer = self
            .framebuffer
            .as_ref()
            .map(Framebuffer::handle)
            .ok_or_else(|| VulkanError::invalid(format!("{}: framebuffer not created", self.name)))?;
        let extent = self.extent();

        let mut active = recorder.begin_render_pass(render_pass, framebuffer, extent, clear_values);
        active.set_viewport(vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        active.set_scissor(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        });
        Ok(active)
    }

    /// Release the framebuffer; concrete passes release their targets first
    pub fn destroy_resizable_objects(&mut self) {
        if let Some(mut framebuffer) = self.framebuffer.take() {
            framebuffer.destroy();
        }
        if self.resizable_valid {
            log::debug!("{}: resizable objects destroyed", self.name);
        }
        self.resizable_valid = false;
    }

    /// Release every fixed object; returns false when already destroyed
    pub fn destroy(&mut self) -> bool {
        if self.state == PassState::Destroyed {
            log::warn!("{}: destroy called twice, ignoring", self.name);
            return false;
        }
        self.destroy_resizable_objects();
        // Pipelines before the layouts and render pass they were built from.
        self.pipelines.clear();
        self.pipeline_layouts.clear();
        self.descriptor_set_layouts.clear();
        if let Some(mut render_pass) = self.render_pass.take() {
            render_pass.destroy();
        }
        self.state = PassState::Destroyed;
        log::debug!("{}: destroyed", self.name);
        true
    }

    fn is_live(&self) -> bool {
        self.state != PassState::Destroyed
    }
}

/// One stage of the frame
///
/// `init` runs once, `create_resizable_objects` follows it and every resize,
/// `prepare` and `record` run every frame. `record` only encodes commands into
/// the frame's command buffer; submission belongs to the caller.
pub trait RenderPass {
    /// Shared state
    fn base(&self) -> &PassBase;

    /// Shared state, mutable
    fn base_mut(&mut self) -> &mut PassBase;

    /// Build the render pass and the fixed layouts and pipelines
    fn init(&mut self) -> VulkanResult<()>;

    /// Refresh per-frame state
    fn prepare(&mut self) -> VulkanResult<()> {
        self.base_mut().mark_prepared()
    }

    /// Record this pass into the frame's command buffer
    fn record(&mut self, frame: &FrameContext) -> VulkanResult<()>;

    /// Create render targets and the framebuffer at `width` x `height`
    fn create_resizable_objects(&mut self, width: u32, height: u32) -> VulkanResult<()>;

    /// Release render targets and the framebuffer
    fn destroy_resizable_objects(&mut self);

    /// Release everything; later calls are no-ops
    fn destroy(&mut self);

    /// Rebuild resizable objects at the new size
    fn resize(&mut self, width: u32, height: u32) -> VulkanResult<()> {
        self.destroy_resizable_objects();
        self.create_resizable_objects(width, height)
    }

    /// Pass name
    fn name(&self) -> &'static str {
        self.base().name()
    }

    /// Lifecycle state
    fn state(&self) -> PassState {
        self.base().state()
    }
}
