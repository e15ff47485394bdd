//! Render pass management
//!
//! A [`RenderPassDescription`] is validated before it reaches the device, then
//! kept by the owning [`RenderPassHandle`] so framebuffers and pipelines can be
//! checked against it.

use ash::vk;
use crate::render::vulkan::transitions::has_depth;
use crate::render::vulkan::{DeviceRef, VulkanError, VulkanResult};

/// Attachment references of one graphics subpass
#[derive(Debug, Clone, Default)]
pub struct SubpassDescription {
    /// Color attachments written by the subpass
    pub color_attachments: Vec<vk::AttachmentReference>,
    /// Optional depth-stencil attachment
    pub depth_stencil_attachment: Option<vk::AttachmentReference>,
}

/// Attachments, subpasses and dependency edges of a render pass
#[derive(Debug, Clone, Default)]
pub struct RenderPassDescription {
    /// Attachment descriptors, indexed by attachment references
    pub attachments: Vec<vk::AttachmentDescription>,
    /// Subpasses in execution order
    pub subpasses: Vec<SubpassDescription>,
    /// Dependency edges between subpasses and the outside world
    pub dependencies: Vec<vk::SubpassDependency>,
}

impl RenderPassDescription {
    /// Color attachment cleared on load and stored
    pub fn color_attachment(format: vk::Format, final_layout: vk::ImageLayout) -> vk::AttachmentDescription {
        vk::AttachmentDescription::builder()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(final_layout)
            .build()
    }

    /// Depth-stencil attachment with depth and stencil cleared on load
    pub fn depth_stencil_attachment(format: vk::Format) -> vk::AttachmentDescription {
        vk::AttachmentDescription::builder()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::CLEAR)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .build()
    }

    /// Build a dependency edge
    pub fn dependency(
        src_subpass: u32,
        dst_subpass: u32,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
    ) -> vk::SubpassDependency {
        vk::SubpassDependency::builder()
            .src_subpass(src_subpass)
            .dst_subpass(dst_subpass)
            .src_stage_mask(src_stage)
            .dst_stage_mask(dst_stage)
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .dependency_flags(vk::DependencyFlags::BY_REGION)
            .build()
    }

    /// Number of attachments a framebuffer must bind
    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    /// Check internal consistency
    ///
    /// Attachment references must index into the attachment array, color
    /// references must name color formats and the depth reference a depth
    /// format. Dependency edges must name existing subpasses (or the external
    /// scope on exactly one side) and every access bit must be reachable by
    /// at least one stage of its mask.
    pub fn validate(&self) -> VulkanResult<()> {
        if self.subpasses.is_empty() {
            return Err(VulkanError::InvalidRenderPass("no subpasses".to_string()));
        }

        for (index, subpass) in self.subpasses.iter().enumerate() {
            for reference in &subpass.color_attachments {
                let attachment = self.referenced(index, reference)?;
                if has_depth(attachment.format) {
                    return Err(VulkanError::InvalidRenderPass(format!(
                        "subpass {} uses depth format {:?} as a color attachment",
                        index, attachment.format
                    )));
                }
                if reference.layout != vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL {
                    return Err(VulkanError::InvalidRenderPass(format!(
                        "subpass {} color reference in layout {:?}",
                        index, reference.layout
                    )));
                }
            }
            if let Some(reference) = &subpass.depth_stencil_attachment {
                let attachment = self.referenced(index, reference)?;
                if !has_depth(attachment.format) {
                    return Err(VulkanError::InvalidRenderPass(format!(
                        "subpass {} uses {:?} as a depth attachment",
                        index, attachment.format
                    )));
                }
            }
        }

        let subpass_count = self.subpasses.len() as u32;
        let valid_subpass = |s: u32| s == vk::SUBPASS_EXTERNAL || s < subpass_count;
        for (index, dependency) in self.dependencies.iter().enumerate() {
            if !valid_subpass(dependency.src_subpass) || !valid_subpass(dependency.dst_subpass) {
                return Err(VulkanError::InvalidRenderPass(format!(
                    "dependency {} names a missing subpass",
                    index
                )));
            }
            if dependency.src_subpass == vk::SUBPASS_EXTERNAL && dependency.dst_subpass == vk::SUBPASS_EXTERNAL {
                return Err(VulkanError::InvalidRenderPass(format!(
                    "dependency {} is external on both sides",
                    index
                )));
            }
            check_access(index, dependency.src_stage_mask, dependency.src_access_mask)?;
            check_access(index, dependency.dst_stage_mask, dependency.dst_access_mask)?;
        }

        Ok(())
    }

    fn referenced(&self, subpass: usize, reference: &vk::AttachmentReference) -> VulkanResult<&vk::AttachmentDescription> {
        self.attachments.get(reference.attachment as usize).ok_or_else(|| {
            VulkanError::InvalidRenderPass(format!(
                "subpass {} references attachment {} of {}",
                subpass,
                reference.attachment,
                self.attachments.len()
            ))
        })
    }
}

/// Stages able to perform each access
fn supported_stages(access: vk::AccessFlags) -> vk::PipelineStageFlags {
    use vk::AccessFlags as A;
    use vk::PipelineStageFlags as S;

    let shaders = S::VERTEX_SHADER
        | S::TESSELLATION_CONTROL_SHADER
        | S::TESSELLATION_EVALUATION_SHADER
        | S::GEOMETRY_SHADER
        | S::FRAGMENT_SHADER
        | S::COMPUTE_SHADER;
    let graphics = S::ALL_GRAPHICS | S::ALL_COMMANDS;

    match access {
        A::INDIRECT_COMMAND_READ => S::DRAW_INDIRECT | graphics,
        A::INDEX_READ | A::VERTEX_ATTRIBUTE_READ => S::VERTEX_INPUT | graphics,
        A::UNIFORM_READ | A::SHADER_READ | A::SHADER_WRITE => shaders | graphics,
        A::INPUT_ATTACHMENT_READ => S::FRAGMENT_SHADER | graphics,
        A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE => S::COLOR_ATTACHMENT_OUTPUT | graphics,
        A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE => {
            S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS | graphics
        }
        A::TRANSFER_READ | A::TRANSFER_WRITE => S::TRANSFER | S::ALL_COMMANDS,
        A::HOST_READ | A::HOST_WRITE => S::HOST | S::ALL_COMMANDS,
        _ => vk::PipelineStageFlags::from_raw(!0),
    }
}

fn check_access(dependency: usize, stages: vk::PipelineStageFlags, access: vk::AccessFlags) -> VulkanResult<()> {
    for bit in 0..32 {
        let flag = vk::AccessFlags::from_raw(1 << bit);
        if access.contains(flag) && !stages.intersects(supported_stages(flag)) {
            return Err(VulkanError::InvalidRenderPass(format!(
                "dependency {} access {:?} not supported by stages {:?}",
                dependency, flag, stages
            )));
        }
    }
    Ok(())
}

/// Render pass wrapper with RAII cleanup
pub struct RenderPassHandle {
    device: DeviceRef,
    render_pass: vk::RenderPass,
    description: RenderPassDescription,
}

impl RenderPassHandle {
    /// Validate `description` and create the render pass
    pub fn new(device: &DeviceRef, description: RenderPassDescription) -> VulkanResult<Self> {
        description.validate()?;
        let render_pass = device.create_render_pass(&description)?;
        log::debug!(
            "Created render pass with {} attachments, {} dependencies",
            description.attachments.len(),
            description.dependencies.len()
        );
        Ok(Self {
            device: device.clone(),
            render_pass,
            description,
        })
    }

    /// Get render pass handle, null once destroyed
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Description the render pass was created from
    pub fn description(&self) -> &RenderPassDescription {
        &self.description
    }

    /// Release the render pass
    pub fn destroy(&mut self) {
        if self.render_pass != vk::RenderPass::null() {
            self.device.destroy_render_pass(self.render_pass);
            self.render_pass = vk::RenderPass::null();
        }
    }
}

impl Drop for RenderPassHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}
