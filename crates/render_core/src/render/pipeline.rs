//! Frame orchestration
//!
//! Drives an ordered list of passes through their lifecycle. The swapchain
//! owner supplies the command buffer for each frame and the new extent on
//! resize; submission and presentation stay with it.

use crate::render::pass::{FrameContext, RenderPass};
use crate::render::vulkan::VulkanResult;

/// Ordered collection of passes
#[derive(Default)]
pub struct PassPipeline {
    passes: Vec<Box<dyn RenderPass>>,
    width: u32,
    height: u32,
}

impl PassPipeline {
    /// Empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pass; it runs after every pass added before it
    pub fn add_pass(&mut self, pass: Box<dyn RenderPass>) {
        self.passes.push(pass);
    }

    /// Number of passes
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Whether no pass has been added
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Passes in execution order
    pub fn passes(&self) -> impl Iterator<Item = &dyn RenderPass> {
        self.passes.iter().map(|pass| pass.as_ref())
    }

    /// Current extent
    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Initialize every pass, then create its resizable objects
    pub fn init(&mut self, width: u32, height: u32) -> VulkanResult<()> {
        for pass in self.passes.iter_mut() {
            pass.init()?;
            pass.create_resizable_objects(width, height)?;
        }
        self.width = width;
        self.height = height;
        log::info!("Pass pipeline ready: {} passes at {}x{}", self.passes.len(), width, height);
        Ok(())
    }

    /// Prepare every pass, then record every pass, in order
    pub fn render_frame(&mut self, frame: &FrameContext) -> VulkanResult<()> {
        for pass in self.passes.iter_mut() {
            pass.prepare()?;
        }
        for pass in self.passes.iter_mut() {
            pass.record(frame)?;
        }
        Ok(())
    }

    /// Rebuild resizable objects on every pass; zero extents (minimized window) are ignored
    pub fn resize(&mut self, width: u32, height: u32) -> VulkanResult<()> {
        if width == 0 || height == 0 {
            log::debug!("Ignoring resize to {}x{}", width, height);
            return Ok(());
        }
        for pass in self.passes.iter_mut() {
            pass.resize(width, height)?;
        }
        self.width = width;
        self.height = height;
        log::debug!("Pass pipeline resized to {}x{}", width, height);
        Ok(())
    }

    /// Destroy every pass in reverse order
    pub fn destroy(&mut self) {
        for pass in self.passes.iter_mut().rev() {
            pass.destroy();
        }
    }
}
