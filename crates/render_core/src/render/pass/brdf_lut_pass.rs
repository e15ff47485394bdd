//! BRDF integration lookup table
//!
//! Renders the split-sum BRDF term into a two-channel half-float target with a
//! single full-screen triangle, reads the target back through a linear staging
//! image and publishes it as an IBL texture asset.

use ash::vk;
use std::sync::Arc;

use crate::assets::{AddressMode, AssetSink, PixelType, Texture2D, TextureType};
use crate::foundation::time::Stopwatch;
use crate::render::pass::{FrameContext, PassBase, RenderPass};
use crate::render::vulkan::util::record_transition;
use crate::render::vulkan::{
    submit_instant_commands, ClearValue, CommandRecorder, DescriptorSetLayout, DeviceRef, GraphicsPipelineDesc,
    Image, ImageConfig, ImageView, MappedMemory, MemoryUsage, Pipeline, PipelineLayout, RenderPassDescription,
    RenderPassHandle, ShaderProvider, SubpassDescription, VulkanError, VulkanResult,
};

/// Pixel layout of the lookup table
pub const BRDF_LUT_PIXEL_TYPE: PixelType = PixelType::RG16;

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
const VERTEX_SHADER: &str = "brdf_lut.vert";
const FRAGMENT_SHADER: &str = "brdf_lut.frag";

/// One-shot pass producing the BRDF lookup texture
pub struct BrdfLutPass {
    base: PassBase,
    shaders: Arc<dyn ShaderProvider>,
    url: String,
    color: Option<ImageView>,
}

impl BrdfLutPass {
    /// Pass saving its result under `url`
    pub fn new(device: &DeviceRef, shaders: Arc<dyn ShaderProvider>, url: impl Into<String>) -> Self {
        Self {
            base: PassBase::new(device, "brdf_lut_pass"),
            shaders,
            url: url.into(),
            color: None,
        }
    }

    /// Asset url of the generated texture
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Render target, present while resizable objects exist
    pub fn color_image_view(&self) -> Option<&ImageView> {
        self.color.as_ref()
    }

    fn format() -> vk::Format {
        BRDF_LUT_PIXEL_TYPE.format()
    }

    fn description() -> RenderPassDescription {
        use vk::AccessFlags as A;
        use vk::PipelineStageFlags as S;

        RenderPassDescription {
            attachments: vec![RenderPassDescription::color_attachment(
                Self::format(),
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )],
            subpasses: vec![SubpassDescription {
                color_attachments: vec![vk::AttachmentReference {
                    attachment: 0,
                    layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                }],
                depth_stencil_attachment: None,
            }],
            dependencies: vec![
                RenderPassDescription::dependency(
                    vk::SUBPASS_EXTERNAL,
                    0,
                    S::TOP_OF_PIPE,
                    S::COLOR_ATTACHMENT_OUTPUT,
                    A::MEMORY_READ,
                    A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
                ),
                RenderPassDescription::dependency(
                    0,
                    vk::SUBPASS_EXTERNAL,
                    S::COLOR_ATTACHMENT_OUTPUT,
                    S::BOTTOM_OF_PIPE,
                    A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
                    A::MEMORY_READ,
                ),
            ],
        }
    }

    fn pipeline(&self) -> VulkanResult<vk::Pipeline> {
        self.base
            .pipelines
            .first()
            .map(Pipeline::handle)
            .ok_or_else(|| VulkanError::invalid("brdf_lut_pass: pipeline not created"))
    }

    fn record_draw(&self, recorder: &mut CommandRecorder<'_>) -> VulkanResult<()> {
        let pipeline = self.pipeline()?;
        let mut active = self.base.begin(recorder, &[ClearValue::Color(CLEAR_COLOR)])?;
        active.bind_pipeline(pipeline);
        active.draw(3, 1, 0, 0);
        Ok(())
    }

    /// Generate the lookup table, hand it to `sink` and return it inflated
    ///
    /// Every step runs in a blocking instant context, so the readback is
    /// ordered after the draw. The staging image lives only for this call.
    pub fn render(&mut self, sink: &dyn AssetSink) -> VulkanResult<Texture2D> {
        if !self.base.resizable_objects_valid() {
            return Err(VulkanError::invalid(format!(
                "brdf_lut_pass: cannot render in state {} without a render target",
                self.base.state()
            )));
        }
        let color_image = self
            .color
            .as_ref()
            .map(ImageView::image)
            .ok_or_else(|| VulkanError::invalid("brdf_lut_pass: render target missing"))?;
        let device = self.base.device.clone();
        let (width, height) = (self.base.width, self.base.height);
        let format = Self::format();

        let mut stopwatch = Stopwatch::start_new();
        submit_instant_commands(&device, |recorder| self.record_draw(recorder))?;

        let staging = Image::new(
            &device,
            ImageConfig::new(width, height, format)
                .tiling(vk::ImageTiling::LINEAR)
                .usage(vk::ImageUsageFlags::TRANSFER_DST)
                .memory_usage(MemoryUsage::HostReadback),
        )?;
        submit_instant_commands(&device, |recorder| {
            use vk::ImageLayout as L;
            let staging = staging.handle();
            record_transition(recorder, color_image, format, L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_SRC_OPTIMAL, 0, 1)?;
            record_transition(recorder, staging, format, L::UNDEFINED, L::TRANSFER_DST_OPTIMAL, 0, 1)?;
            recorder.copy_image(color_image, staging, width, height);
            record_transition(recorder, color_image, format, L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL, 0, 1)
        })?;
        log::info!("generate brdf lut time: {}ms", stopwatch.stop());

        let allocation = staging
            .allocation()
            .ok_or_else(|| VulkanError::invalid("brdf_lut_pass: staging image has no allocation"))?;
        let layout = device.image_subresource_layout(staging.handle(), vk::ImageAspectFlags::COLOR);
        let mapped = MappedMemory::map(&device, allocation, (layout.offset + layout.size) as usize)?;

        let mut texture = Texture2D::new(self.url.clone());
        texture.width = width;
        texture.height = height;
        texture.set_address_mode(AddressMode::ClampToEdge);
        texture.texture_type = TextureType::Ibl;
        texture.pixel_type = BRDF_LUT_PIXEL_TYPE;
        texture.image_data = read_rows(&mapped, &layout, width, height, BRDF_LUT_PIXEL_TYPE.bytes_per_pixel())?;

        texture.inflate(&device)?;
        sink.serialize_asset(&texture)?;
        drop(mapped);

        log::debug!("brdf_lut_pass: published {}", texture.url);
        Ok(texture)
    }
}

/// Copy `height` rows of `width` texels out of a linear image mapping
fn read_rows(
    mapped: &MappedMemory<'_>,
    layout: &vk::SubresourceLayout,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> VulkanResult<Vec<u8>> {
    let row_bytes = width as usize * bytes_per_pixel;
    let row_pitch = layout.row_pitch as usize;
    let offset = layout.offset as usize;
    let height = height as usize;
    if row_pitch < row_bytes || (layout.size as usize) < row_pitch * height.saturating_sub(1) + row_bytes {
        return Err(VulkanError::invalid(format!(
            "staging layout (pitch {}, size {}) cannot hold {}x{} texels",
            layout.row_pitch, layout.size, width, height
        )));
    }

    if row_pitch == row_bytes {
        return Ok(mapped.read(offset, row_bytes * height)?.to_vec());
    }
    let mut data = Vec::with_capacity(row_bytes * height);
    for y in 0..height {
        data.extend_from_slice(mapped.read(offset + y * row_pitch, row_bytes)?);
    }
    Ok(data)
}

impl RenderPass for BrdfLutPass {
    fn base(&self) -> &PassBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PassBase {
        &mut self.base
    }

    fn init(&mut self) -> VulkanResult<()> {
        self.base.begin_init()?;
        let device = self.base.device.clone();

        let render_pass = RenderPassHandle::new(&device, Self::description())?;
        let set_layout = DescriptorSetLayout::new(&device, &[])?;
        let pipeline_layout = PipelineLayout::new(&device, &[&set_layout], &[])?;

        let mut desc = GraphicsPipelineDesc::new(pipeline_layout.handle(), render_pass.handle(), 0);
        desc.stages = vec![
            self.shaders.shader_stage(VERTEX_SHADER, vk::ShaderStageFlags::VERTEX)?,
            self.shaders.shader_stage(FRAGMENT_SHADER, vk::ShaderStageFlags::FRAGMENT)?,
        ];
        desc.cull_mode = vk::CullModeFlags::NONE;
        desc.depth_test = false;
        desc.depth_write = false;
        let pipeline = Pipeline::new(&device, &desc)?;

        self.base.render_pass = Some(render_pass);
        self.base.descriptor_set_layouts.push(set_layout);
        self.base.pipeline_layouts.push(pipeline_layout);
        self.base.pipelines.push(pipeline);
        self.base.finish_init();
        Ok(())
    }

    fn record(&mut self, frame: &FrameContext) -> VulkanResult<()> {
        self.base.begin_record()?;
        let device = self.base.device.clone();
        let mut recorder = CommandRecorder::new(device.as_ref(), frame.command_buffer);
        self.record_draw(&mut recorder)?;
        self.base.finish_record();
        Ok(())
    }

    fn create_resizable_objects(&mut self, width: u32, height: u32) -> VulkanResult<()> {
        self.base.begin_create_resizable(width, height)?;
        let color = ImageView::new(
            &self.base.device,
            ImageConfig::new(width, height, Self::format()).usage(
                vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::SAMPLED
                    | vk::ImageUsageFlags::TRANSFER_SRC,
            ),
        )?;
        self.base.create_framebuffer(&[&color], width, height)?;
        self.color = Some(color);
        self.base.finish_create_resizable(width, height);
        Ok(())
    }

    fn destroy_resizable_objects(&mut self) {
        self.base.destroy_resizable_objects();
        if let Some(mut color) = self.color.take() {
            color.destroy();
        }
    }

    fn destroy(&mut self) {
        self.destroy_resizable_objects();
        self.base.destroy();
    }
}
