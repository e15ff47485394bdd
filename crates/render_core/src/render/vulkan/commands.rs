//! Command recording
//!
//! Commands are encoded as [`Command`] values and handed to the device context,
//! which forwards them to the command buffer. [`InstantCommands`] wraps the
//! one-shot submit-and-wait context used for setup and transfer work.

use ash::vk;
use crate::render::vulkan::{DeviceRef, GpuDevice, VulkanResult};

/// Clear value for one attachment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    /// Float color clear
    Color([f32; 4]),
    /// Depth and stencil clear
    DepthStencil {
        /// Depth value
        depth: f32,
        /// Stencil value
        stencil: u32,
    },
}

impl ClearValue {
    /// Convert to the raw Vulkan union
    pub fn to_vk(self) -> vk::ClearValue {
        match self {
            Self::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            Self::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

/// Image memory barrier without queue family ownership transfer
#[derive(Debug, Clone, Copy)]
pub struct ImageBarrier {
    /// Target image
    pub image: vk::Image,
    /// Layout before the barrier
    pub old_layout: vk::ImageLayout,
    /// Layout after the barrier
    pub new_layout: vk::ImageLayout,
    /// Writes made available
    pub src_access: vk::AccessFlags,
    /// Accesses made visible
    pub dst_access: vk::AccessFlags,
    /// Covered subresources
    pub subresource_range: vk::ImageSubresourceRange,
}

impl ImageBarrier {
    /// Convert to the raw Vulkan structure
    pub fn to_vk(&self) -> vk::ImageMemoryBarrier {
        vk::ImageMemoryBarrier::builder()
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(self.subresource_range)
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
            .build()
    }
}

/// One recorded GPU command
#[derive(Debug, Clone)]
pub enum Command {
    /// Begin a render pass instance with inline subpass contents
    BeginRenderPass {
        /// Render pass handle
        render_pass: vk::RenderPass,
        /// Framebuffer bound to the render pass
        framebuffer: vk::Framebuffer,
        /// Render area extent, offset is always zero
        extent: vk::Extent2D,
        /// One clear value per attachment
        clear_values: Vec<ClearValue>,
    },
    /// End the current render pass instance
    EndRenderPass,
    /// Set viewport 0
    SetViewport(vk::Viewport),
    /// Set scissor 0
    SetScissor(vk::Rect2D),
    /// Bind a graphics pipeline
    BindPipeline(vk::Pipeline),
    /// Non-indexed draw
    Draw {
        /// Vertices per instance
        vertex_count: u32,
        /// Instances
        instance_count: u32,
        /// First vertex index
        first_vertex: u32,
        /// First instance index
        first_instance: u32,
    },
    /// Pipeline barrier with image barriers only
    PipelineBarrier {
        /// Source stage mask
        src_stage: vk::PipelineStageFlags,
        /// Destination stage mask
        dst_stage: vk::PipelineStageFlags,
        /// Image barriers
        image_barriers: Vec<ImageBarrier>,
    },
    /// Buffer to buffer copy
    CopyBuffer {
        /// Source buffer
        src: vk::Buffer,
        /// Destination buffer
        dst: vk::Buffer,
        /// Regions
        regions: Vec<vk::BufferCopy>,
    },
    /// Buffer to image copy, image in `TRANSFER_DST_OPTIMAL`
    CopyBufferToImage {
        /// Source buffer
        src: vk::Buffer,
        /// Destination image
        dst: vk::Image,
        /// Regions
        regions: Vec<vk::BufferImageCopy>,
    },
    /// Image to image copy, `TRANSFER_SRC_OPTIMAL` to `TRANSFER_DST_OPTIMAL`
    CopyImage {
        /// Source image
        src: vk::Image,
        /// Destination image
        dst: vk::Image,
        /// Regions
        regions: Vec<vk::ImageCopy>,
    },
    /// Filtered blit inside or between images
    BlitImage {
        /// Source image, `TRANSFER_SRC_OPTIMAL`
        src: vk::Image,
        /// Destination image, `TRANSFER_DST_OPTIMAL`
        dst: vk::Image,
        /// Regions
        regions: Vec<vk::ImageBlit>,
        /// Filter
        filter: vk::Filter,
    },
}

/// Command recorder bound to one command buffer
pub struct CommandRecorder<'a> {
    device: &'a dyn GpuDevice,
    command_buffer: vk::CommandBuffer,
}

impl<'a> CommandRecorder<'a> {
    /// Wrap a command buffer that is already in the recording state
    pub fn new(device: &'a dyn GpuDevice, command_buffer: vk::CommandBuffer) -> Self {
        Self {
            device,
            command_buffer,
        }
    }

    /// Get the command buffer handle
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Begin render pass; the pass ends when the returned guard drops
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[ClearValue],
    ) -> ActiveRenderPass<'_, 'a> {
        self.push(Command::BeginRenderPass {
            render_pass,
            framebuffer,
            extent,
            clear_values: clear_values.to_vec(),
        });
        ActiveRenderPass { recorder: self }
    }

    /// Record a pipeline barrier over image subresources
    pub fn pipeline_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[ImageBarrier],
    ) {
        self.push(Command::PipelineBarrier {
            src_stage,
            dst_stage,
            image_barriers: image_barriers.to_vec(),
        });
    }

    /// Copy `size` bytes from the start of `src` to the start of `dst`
    pub fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        self.push(Command::CopyBuffer {
            src,
            dst,
            regions: vec![region],
        });
    }

    /// Copy a tightly packed buffer into mip 0 of an image
    pub fn copy_buffer_to_image(&mut self, src: vk::Buffer, dst: vk::Image, width: u32, height: u32) {
        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(color_layers(0))
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D { width, height, depth: 1 })
            .build();
        self.push(Command::CopyBufferToImage {
            src,
            dst,
            regions: vec![region],
        });
    }

    /// Copy mip 0 of a color image into another color image
    pub fn copy_image(&mut self, src: vk::Image, dst: vk::Image, width: u32, height: u32) {
        let region = vk::ImageCopy::builder()
            .src_subresource(color_layers(0))
            .dst_subresource(color_layers(0))
            .extent(vk::Extent3D { width, height, depth: 1 })
            .build();
        self.push(Command::CopyImage {
            src,
            dst,
            regions: vec![region],
        });
    }

    /// Blit between two images (or two mips of one image)
    pub fn blit_image(&mut self, src: vk::Image, dst: vk::Image, region: vk::ImageBlit, filter: vk::Filter) {
        self.push(Command::BlitImage {
            src,
            dst,
            regions: vec![region],
            filter,
        });
    }

    fn push(&mut self, command: Command) {
        self.device.record(self.command_buffer, &command);
    }
}

/// Active render pass; ends the pass on drop
pub struct ActiveRenderPass<'r, 'a> {
    recorder: &'r mut CommandRecorder<'a>,
}

impl<'r, 'a> ActiveRenderPass<'r, 'a> {
    /// Set viewport
    pub fn set_viewport(&mut self, viewport: vk::Viewport) {
        self.recorder.push(Command::SetViewport(viewport));
    }

    /// Set scissor
    pub fn set_scissor(&mut self, scissor: vk::Rect2D) {
        self.recorder.push(Command::SetScissor(scissor));
    }

    /// Bind graphics pipeline
    pub fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.recorder.push(Command::BindPipeline(pipeline));
    }

    /// Draw
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.recorder.push(Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }
}

impl<'r, 'a> Drop for ActiveRenderPass<'r, 'a> {
    fn drop(&mut self) {
        self.recorder.push(Command::EndRenderPass);
    }
}

/// Transient command buffer that is submitted and awaited on
/// [`end_instant_commands`]
///
/// Dropping it without ending is a programming error and panics.
#[must_use = "instant commands must be ended with end_instant_commands"]
pub struct InstantCommands {
    device: DeviceRef,
    command_buffer: vk::CommandBuffer,
    finished: bool,
}

impl InstantCommands {
    /// Recorder for this command buffer
    pub fn recorder(&self) -> CommandRecorder<'_> {
        CommandRecorder::new(self.device.as_ref(), self.command_buffer)
    }

    /// Get the command buffer handle
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }
}

impl Drop for InstantCommands {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.device.abandon_instant_commands(self.command_buffer);
        if !std::thread::panicking() {
            panic!("instant command buffer dropped without end_instant_commands");
        }
    }
}

/// Begin a one-shot command context
pub fn begin_instant_commands(device: &DeviceRef) -> VulkanResult<InstantCommands> {
    let command_buffer = device.begin_instant_commands()?;
    Ok(InstantCommands {
        device: device.clone(),
        command_buffer,
        finished: false,
    })
}

/// Submit the commands and block until the device has executed them
///
/// Buffers and images used by the batch can be reused or freed once this
/// returns.
pub fn end_instant_commands(mut commands: InstantCommands) -> VulkanResult<()> {
    commands.finished = true;
    commands.device.end_instant_commands(commands.command_buffer)
}

/// Record `f` into an instant context and submit it
///
/// If `f` fails the command buffer is freed without submission.
pub fn submit_instant_commands<F>(device: &DeviceRef, f: F) -> VulkanResult<()>
where
    F: FnOnce(&mut CommandRecorder<'_>) -> VulkanResult<()>,
{
    let mut commands = begin_instant_commands(device)?;
    let recorded = {
        let mut recorder = commands.recorder();
        f(&mut recorder)
    };
    match recorded {
        Ok(()) => end_instant_commands(commands),
        Err(e) => {
            commands.finished = true;
            device.abandon_instant_commands(commands.command_buffer);
            Err(e)
        }
    }
}

/// Single color layer at `mip_level`
pub(crate) fn color_layers(mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level,
        base_array_layer: 0,
        layer_count: 1,
    }
}
