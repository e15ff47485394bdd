//! Graphics pipeline state and layout objects
//!
//! [`GraphicsPipelineDesc::new`] carries the base state every pass starts from:
//! triangle lists, filled polygons, back-face culling with counter-clockwise
//! front faces, depth test and write with `LESS_OR_EQUAL`, no blending, one
//! sample, and viewport/scissor as dynamic state. Passes override fields
//! before building the pipeline.

use ash::vk;
use crate::render::vulkan::{DeviceRef, VulkanError, VulkanResult};

/// One programmable stage of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderStageDesc {
    /// Stage the module runs in
    pub stage: vk::ShaderStageFlags,
    /// Module handle; entry point is always `main`
    pub module: vk::ShaderModule,
}

/// Everything needed to build one graphics pipeline
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDesc {
    /// Programmable stages
    pub stages: Vec<ShaderStageDesc>,
    /// Vertex buffer bindings, empty for procedurally generated vertices
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    /// Vertex attributes
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    /// Primitive topology
    pub topology: vk::PrimitiveTopology,
    /// Polygon fill mode
    pub polygon_mode: vk::PolygonMode,
    /// Face culling
    pub cull_mode: vk::CullModeFlags,
    /// Front face winding
    pub front_face: vk::FrontFace,
    /// Depth test enable
    pub depth_test: bool,
    /// Depth write enable
    pub depth_write: bool,
    /// Depth comparison
    pub depth_compare_op: vk::CompareOp,
    /// Number of color attachments in the target subpass
    pub color_attachment_count: u32,
    /// Alpha blending on every color attachment
    pub blend_enable: bool,
    /// Rasterization samples
    pub sample_count: vk::SampleCountFlags,
    /// Dynamic states
    pub dynamic_states: Vec<vk::DynamicState>,
    /// Pipeline layout
    pub layout: vk::PipelineLayout,
    /// Render pass the pipeline is compatible with
    pub render_pass: vk::RenderPass,
    /// Subpass index inside `render_pass`
    pub subpass: u32,
}

impl GraphicsPipelineDesc {
    /// Base pipeline state for `render_pass` / `subpass`
    pub fn new(layout: vk::PipelineLayout, render_pass: vk::RenderPass, subpass: u32) -> Self {
        Self {
            stages: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
            depth_write: true,
            depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
            color_attachment_count: 1,
            blend_enable: false,
            sample_count: vk::SampleCountFlags::TYPE_1,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            layout,
            render_pass,
            subpass,
        }
    }

    fn validate(&self) -> VulkanResult<()> {
        if self.render_pass == vk::RenderPass::null() {
            return Err(VulkanError::invalid("pipeline has no render pass"));
        }
        if !self.stages.iter().any(|s| s.stage == vk::ShaderStageFlags::VERTEX) {
            return Err(VulkanError::invalid("pipeline has no vertex stage"));
        }
        Ok(())
    }
}

/// Descriptor set layout with RAII cleanup
pub struct DescriptorSetLayout {
    device: DeviceRef,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Create from bindings; an empty slice yields an empty layout
    pub fn new(device: &DeviceRef, bindings: &[vk::DescriptorSetLayoutBinding]) -> VulkanResult<Self> {
        let layout = device.create_descriptor_set_layout(bindings)?;
        Ok(Self {
            device: device.clone(),
            layout,
        })
    }

    /// Get layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        if self.layout != vk::DescriptorSetLayout::null() {
            self.device.destroy_descriptor_set_layout(self.layout);
        }
    }
}

/// Pipeline layout with RAII cleanup
pub struct PipelineLayout {
    device: DeviceRef,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Create over `set_layouts` and `push_constant_ranges`
    pub fn new(
        device: &DeviceRef,
        set_layouts: &[&DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> VulkanResult<Self> {
        let handles: Vec<_> = set_layouts.iter().map(|l| l.handle()).collect();
        let layout = device.create_pipeline_layout(&handles, push_constant_ranges)?;
        Ok(Self {
            device: device.clone(),
            layout,
        })
    }

    /// Get layout handle
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        if self.layout != vk::PipelineLayout::null() {
            self.device.destroy_pipeline_layout(self.layout);
        }
    }
}

/// Graphics pipeline bound to one render pass and subpass
pub struct Pipeline {
    device: DeviceRef,
    pipeline: vk::Pipeline,
    render_pass: vk::RenderPass,
    subpass: u32,
}

impl Pipeline {
    /// Build the pipeline described by `desc`
    pub fn new(device: &DeviceRef, desc: &GraphicsPipelineDesc) -> VulkanResult<Self> {
        desc.validate()?;
        let pipeline = device.create_graphics_pipeline(desc)?;
        log::debug!("Created graphics pipeline with {} stages", desc.stages.len());
        Ok(Self {
            device: device.clone(),
            pipeline,
            render_pass: desc.render_pass,
            subpass: desc.subpass,
        })
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Render pass the pipeline was built against
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Subpass the pipeline was built against
    pub fn subpass(&self) -> u32 {
        self.subpass
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.pipeline != vk::Pipeline::null() {
            self.device.destroy_pipeline(self.pipeline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::testing::{MockDevice, ObjectKind};
    use ash::vk::Handle;
    use std::sync::Arc;

    #[test]
    fn test_base_state() {
        let desc = GraphicsPipelineDesc::new(vk::PipelineLayout::null(), vk::RenderPass::null(), 0);
        assert_eq!(desc.cull_mode, vk::CullModeFlags::BACK);
        assert!(desc.depth_test);
        assert_eq!(desc.dynamic_states.len(), 2);
        assert!(desc.vertex_bindings.is_empty());
    }

    #[test]
    fn test_pipeline_without_vertex_stage_is_rejected() {
        let mock = Arc::new(MockDevice::new());
        let device: DeviceRef = mock.clone();
        let desc = GraphicsPipelineDesc::new(vk::PipelineLayout::null(), vk::RenderPass::from_raw(9), 0);
        assert!(Pipeline::new(&device, &desc).is_err());
        assert_eq!(mock.created(ObjectKind::Pipeline), 0);
    }

    #[test]
    fn test_pipeline_records_its_render_pass() {
        let mock = Arc::new(MockDevice::new());
        let device: DeviceRef = mock.clone();
        let set_layout = DescriptorSetLayout::new(&device, &[]).unwrap();
        let layout = PipelineLayout::new(&device, &[&set_layout], &[]).unwrap();
        let mut desc = GraphicsPipelineDesc::new(layout.handle(), vk::RenderPass::from_raw(42), 0);
        desc.stages.push(ShaderStageDesc {
            stage: vk::ShaderStageFlags::VERTEX,
            module: vk::ShaderModule::from_raw(7),
        });

        let pipeline = Pipeline::new(&device, &desc).unwrap();
        assert_eq!(pipeline.render_pass(), vk::RenderPass::from_raw(42));
        assert_eq!(mock.pipeline_target(pipeline.handle()), Some((vk::RenderPass::from_raw(42), 0)));

        drop(pipeline);
        drop(layout);
        drop(set_layout);
        assert_eq!(mock.total_live(), 0);
    }
}
