//! Framebuffer management
//!
//! Framebuffers are checked against the render pass they bind to before they
//! are created: same attachment count, same format per slot.

use ash::vk;
use crate::render::vulkan::image::ImageView;
use crate::render::vulkan::render_pass::RenderPassHandle;
use crate::render::vulkan::{DeviceRef, VulkanError, VulkanResult};

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: DeviceRef,
    framebuffer: vk::Framebuffer,
    attachment_count: usize,
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Create a framebuffer binding `attachments` to `render_pass` at `extent`
    pub fn new(
        device: &DeviceRef,
        render_pass: &RenderPassHandle,
        attachments: &[&ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let expected = render_pass.description().attachments.as_slice();
        if expected.len() != attachments.len() {
            return Err(VulkanError::AttachmentMismatch {
                expected: expected.len(),
                actual: attachments.len(),
            });
        }
        for (index, (description, view)) in expected.iter().zip(attachments).enumerate() {
            if description.format != view.format() {
                return Err(VulkanError::AttachmentFormatMismatch {
                    index,
                    expected: description.format,
                    actual: view.format(),
                });
            }
            let view_extent = view.extent();
            if view_extent.width < extent.width || view_extent.height < extent.height {
                return Err(VulkanError::invalid(format!(
                    "attachment {} is {}x{}, framebuffer needs {}x{}",
                    index, view_extent.width, view_extent.height, extent.width, extent.height
                )));
            }
        }

        let views: Vec<vk::ImageView> = attachments.iter().map(|view| view.view()).collect();
        let framebuffer = device.create_framebuffer(render_pass.handle(), &views, extent.width, extent.height)?;
        log::trace!("Created framebuffer {}x{} with {} attachments", extent.width, extent.height, views.len());

        Ok(Self {
            device: device.clone(),
            framebuffer,
            attachment_count: views.len(),
            extent,
        })
    }

    /// Get the framebuffer handle, null once destroyed
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Number of bound attachments
    pub fn attachment_count(&self) -> usize {
        self.attachment_count
    }

    /// Framebuffer size
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Release the framebuffer
    pub fn destroy(&mut self) {
        if self.framebuffer != vk::Framebuffer::null() {
            self.device.destroy_framebuffer(self.framebuffer);
            self.framebuffer = vk::Framebuffer::null();
        }
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}
