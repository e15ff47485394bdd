//! Color + depth pass
//!
//! Renders into its own color target which downstream passes sample. The two
//! subpass dependencies order this pass against its consumers: the previous
//! frame's fragment-shader reads finish before the color write, and the color
//! write finishes before the next fragment-shader read.

use ash::vk;

use crate::config::BasePassConfig;
use crate::render::pass::{FrameContext, PassBase, RenderPass};
use crate::render::vulkan::transitions::depth_aspect;
use crate::render::vulkan::{
    ClearValue, CommandRecorder, DeviceRef, ImageConfig, ImageView, RenderPassDescription, RenderPassHandle,
    SubpassDescription, VulkanResult,
};

/// Pass with a fixed color + depth-stencil target
pub struct BasePass {
    base: PassBase,
    clear_color: [f32; 4],
    color: Option<ImageView>,
    depth: Option<ImageView>,
}

impl BasePass {
    /// Pass clearing its color target to `clear_color`
    pub fn new(device: &DeviceRef, clear_color: [f32; 4]) -> Self {
        Self {
            base: PassBase::new(device, "base_pass"),
            clear_color,
            color: None,
            depth: None,
        }
    }

    /// Pass using the clear color from `config`
    pub fn from_config(device: &DeviceRef, config: &BasePassConfig) -> Self {
        Self::new(device, config.clear_color)
    }

    /// Color target, present while resizable objects exist
    pub fn color_image_view(&self) -> Option<&ImageView> {
        self.color.as_ref()
    }

    /// Depth-stencil target, present while resizable objects exist
    pub fn depth_image_view(&self) -> Option<&ImageView> {
        self.depth.as_ref()
    }

    fn description(&self) -> RenderPassDescription {
        let formats = self.base.device.surface_formats();
        RenderPassDescription {
            attachments: vec![
                RenderPassDescription::color_attachment(formats.color, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                RenderPassDescription::depth_stencil_attachment(formats.depth),
            ],
            subpasses: vec![SubpassDescription {
                color_attachments: vec![vk::AttachmentReference {
                    attachment: 0,
                    layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                }],
                depth_stencil_attachment: Some(vk::AttachmentReference {
                    attachment: 1,
                    layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                }),
            }],
            dependencies: vec![
                RenderPassDescription::dependency(
                    vk::SUBPASS_EXTERNAL,
                    0,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    vk::AccessFlags::SHADER_READ,
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                ),
                RenderPassDescription::dependency(
                    0,
                    vk::SUBPASS_EXTERNAL,
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                    vk::AccessFlags::SHADER_READ,
                ),
            ],
        }
    }

    fn clear_values(&self) -> [ClearValue; 2] {
        [
            ClearValue::Color(self.clear_color),
            ClearValue::DepthStencil { depth: 1.0, stencil: 0 },
        ]
    }
}

impl RenderPass for BasePass {
    fn base(&self) -> &PassBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PassBase {
        &mut self.base
    }

    fn init(&mut self) -> VulkanResult<()> {
        self.base.begin_init()?;
        let description = self.description();
        self.base.render_pass = Some(RenderPassHandle::new(&self.base.device, description)?);
        self.base.finish_init();
        Ok(())
    }

    fn record(&mut self, frame: &FrameContext) -> VulkanResult<()> {
        self.base.begin_record()?;
        let device = self.base.device.clone();
        let mut recorder = CommandRecorder::new(device.as_ref(), frame.command_buffer);
        {
            let _active = self.base.begin(&mut recorder, &self.clear_values())?;
        }
        self.base.finish_record();
        Ok(())
    }

    fn create_resizable_objects(&mut self, width: u32, height: u32) -> VulkanResult<()> {
        self.base.begin_create_resizable(width, height)?;
        let formats = self.base.device.surface_formats();

        let color = ImageView::new(
            &self.base.device,
            ImageConfig::new(width, height, formats.color)
                .usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED),
        )?;
        let depth = ImageView::new(
            &self.base.device,
            ImageConfig::new(width, height, formats.depth)
                .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
                .aspect(depth_aspect(formats.depth)),
        )?;
        self.base.create_framebuffer(&[&color, &depth], width, height)?;

        self.color = Some(color);
        self.depth = Some(depth);
        self.base.finish_create_resizable(width, height);
        Ok(())
    }

    fn destroy_resizable_objects(&mut self) {
        // The framebuffer references the views, release it first.
        self.base.destroy_resizable_objects();
        if let Some(mut depth) = self.depth.take() {
            depth.destroy();
        }
        if let Some(mut color) = self.color.take() {
            color.destroy();
        }
    }

    fn destroy(&mut self) {
        self.destroy_resizable_objects();
        self.base.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::pass::PassState;
    use crate::render::vulkan::testing::{MockDevice, ObjectKind};
    use crate::render::vulkan::{Command, VulkanError};
    use ash::vk::Handle;
    use std::sync::Arc;

    fn pass(mock: &Arc<MockDevice>) -> BasePass {
        let device: DeviceRef = mock.clone();
        BasePass::new(&device, [0.0, 0.3, 0.0, 1.0])
    }

    fn frame() -> FrameContext {
        FrameContext {
            command_buffer: vk::CommandBuffer::from_raw(0xF00D),
            frame_index: 0,
        }
    }

    #[test]
    fn test_init_builds_two_attachments_and_dependencies() {
        let mock = Arc::new(MockDevice::new());
        let mut pass = pass(&mock);
        pass.init().unwrap();

        let description = pass.base().render_pass().unwrap().description();
        assert_eq!(description.attachment_count(), 2);
        assert_eq!(description.attachments[0].format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(description.attachments[1].format, vk::Format::D32_SFLOAT_S8_UINT);
        assert_eq!(
            description.attachments[0].final_layout,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );

        let incoming = &description.dependencies[0];
        assert_eq!(incoming.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(incoming.src_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(incoming.dst_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        let outgoing = &description.dependencies[1];
        assert_eq!(outgoing.dst_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(outgoing.dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(outgoing.dst_access_mask, vk::AccessFlags::SHADER_READ);
        assert_eq!(pass.state(), PassState::Initialized);
    }

    #[test]
    fn test_resize_800x600_to_1024x768() {
        let mock = Arc::new(MockDevice::new());
        let mut pass = pass(&mock);
        pass.init().unwrap();
        pass.create_resizable_objects(800, 600).unwrap();
        let old_framebuffer = pass.base().framebuffer.as_ref().unwrap().handle();

        pass.resize(1024, 768).unwrap();

        let images = mock.live_images();
        assert_eq!(images.len(), 2);
        let color: Vec<_> = images.iter().filter(|c| c.format == vk::Format::B8G8R8A8_UNORM).collect();
        let depth: Vec<_> = images
            .iter()
            .filter(|c| c.format == vk::Format::D32_SFLOAT_S8_UINT)
            .collect();
        assert_eq!(color.len(), 1);
        assert_eq!(depth.len(), 1);
        for config in images.iter() {
            assert_eq!((config.width, config.height), (1024, 768));
        }
        assert_eq!(mock.live(ObjectKind::ImageView), 2);
        assert_eq!(mock.live(ObjectKind::Framebuffer), 1);
        assert!(mock.framebuffer_info(old_framebuffer).is_none());
        assert_eq!(pass.base().extent(), vk::Extent2D { width: 1024, height: 768 });
    }

    #[test]
    fn test_framebuffer_matches_render_pass() {
        let mock = Arc::new(MockDevice::new());
        let mut pass = pass(&mock);
        pass.init().unwrap();
        for (w, h) in [(1, 1), (640, 480), (3840, 2160)] {
            pass.resize(w, h).unwrap();
            let framebuffer = pass.base().framebuffer.as_ref().unwrap();
            let info = mock.framebuffer_info(framebuffer.handle()).unwrap();
            assert_eq!(info.attachment_count, pass.base().render_pass().unwrap().description().attachment_count());
            assert_eq!((info.width, info.height), (w, h));
        }
    }

    #[test]
    fn test_create_destroy_create_leaks_nothing() {
        let mock = Arc::new(MockDevice::new());
        let mut pass = pass(&mock);
        pass.init().unwrap();
        pass.create_resizable_objects(320, 200).unwrap();
        pass.destroy_resizable_objects();
        pass.create_resizable_objects(320, 200).unwrap();
        pass.destroy_resizable_objects();

        assert_eq!(mock.live(ObjectKind::Image), 0);
        assert_eq!(mock.live(ObjectKind::ImageView), 0);
        assert_eq!(mock.live(ObjectKind::Framebuffer), 0);
        assert_eq!(mock.live_allocations(), 0);
        assert!(!pass.base().resizable_objects_valid());
    }

    #[test]
    fn test_same_size_resize_keeps_observable_state() {
        let mock = Arc::new(MockDevice::new());
        let mut pass = pass(&mock);
        pass.init().unwrap();
        pass.create_resizable_objects(640, 480).unwrap();
        let mut before = mock.live_images();
        pass.resize(640, 480).unwrap();
        pass.resize(640, 480).unwrap();
        let mut after = mock.live_images();

        let key = |c: &ImageConfig| c.format.as_raw();
        before.sort_by_key(key);
        after.sort_by_key(key);
        assert_eq!(before, after);
        assert_eq!(mock.live(ObjectKind::Framebuffer), 1);
    }

    #[test]
    fn test_record_clears_and_sets_viewport() {
        let mock = Arc::new(MockDevice::new());
        let mut pass = pass(&mock);
        pass.init().unwrap();
        pass.create_resizable_objects(800, 600).unwrap();
        pass.prepare().unwrap();
        pass.record(&frame()).unwrap();
        assert_eq!(pass.state(), PassState::Recorded);

        let commands = mock.commands_for(frame().command_buffer);
        assert_eq!(commands.len(), 4);
        match &commands[0] {
            Command::BeginRenderPass {
                extent, clear_values, ..
            } => {
                assert_eq!(*extent, vk::Extent2D { width: 800, height: 600 });
                assert_eq!(clear_values[0], ClearValue::Color([0.0, 0.3, 0.0, 1.0]));
                assert_eq!(clear_values[1], ClearValue::DepthStencil { depth: 1.0, stencil: 0 });
            }
            other => panic!("unexpected {:?}", other),
        }
        match &commands[1] {
            Command::SetViewport(viewport) => {
                approx::assert_relative_eq!(viewport.width, 800.0);
                approx::assert_relative_eq!(viewport.height, 600.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(commands[2], Command::SetScissor(_)));
        assert!(matches!(commands[3], Command::EndRenderPass));
    }

    #[test]
    fn test_configured_clear_color_reaches_render_pass_begin() {
        let config: crate::config::RenderCoreConfig =
            toml::from_str("[base_pass]\nclear_color = [0.25, 0.5, 0.75, 1.0]\n").unwrap();
        let mock = Arc::new(MockDevice::new());
        let device: DeviceRef = mock.clone();
        let mut pass = BasePass::from_config(&device, &config.base_pass);
        pass.init().unwrap();
        pass.create_resizable_objects(16, 16).unwrap();
        pass.prepare().unwrap();
        pass.record(&frame()).unwrap();

        let clear = mock
            .commands_for(frame().command_buffer)
            .into_iter()
            .find_map(|c| match c {
                Command::BeginRenderPass { clear_values, .. } => Some(clear_values[0]),
                _ => None,
            });
        assert_eq!(clear, Some(ClearValue::Color([0.25, 0.5, 0.75, 1.0])));
    }

    #[test]
    fn test_record_without_prepare_fails() {
        let mock = Arc::new(MockDevice::new());
        let mut pass = pass(&mock);
        pass.init().unwrap();
        pass.create_resizable_objects(8, 8).unwrap();
        assert!(matches!(
            pass.record(&frame()),
            Err(VulkanError::InvalidOperation { .. })
        ));
        assert!(mock.commands().is_empty());
    }

    #[test]
    fn test_failed_framebuffer_releases_targets() {
        let mock = Arc::new(MockDevice::new());
        let mut pass = pass(&mock);
        pass.init().unwrap();
        mock.fail_next(ObjectKind::Framebuffer);
        assert!(pass.create_resizable_objects(64, 64).is_err());
        assert_eq!(mock.live(ObjectKind::Image), 0);
        assert!(!pass.base().resizable_objects_valid());

        pass.create_resizable_objects(64, 64).unwrap();
        assert_eq!(mock.live(ObjectKind::Image), 2);
    }

    #[test]
    fn test_double_destroy_frees_once() {
        let mock = Arc::new(MockDevice::new());
        let mut pass = pass(&mock);
        pass.init().unwrap();
        pass.create_resizable_objects(800, 600).unwrap();
        pass.destroy();
        pass.destroy();

        assert_eq!(mock.total_live(), 0);
        assert_eq!(mock.live_allocations(), 0);
        assert_eq!(mock.double_frees(), 0);
        assert_eq!(pass.state(), PassState::Destroyed);
        assert!(pass.color_image_view().is_none());
    }
}
