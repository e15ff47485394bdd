//! Vulkan device resource layer
//!
//! Ownership wrappers for device objects, the layout transition table, one-shot
//! command submission and the production device context.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod device;
pub mod framebuffer;
pub mod image;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod transitions;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer::{copy_buffer, create_buffer, create_index_buffer, create_vertex_buffer, Buffer, MappedMemory};
pub use commands::{
    begin_instant_commands, end_instant_commands, submit_instant_commands, ActiveRenderPass, ClearValue,
    Command, CommandRecorder, ImageBarrier, InstantCommands,
};
pub use context::{
    AllocationKey, DeviceRef, GpuDevice, MemoryUsage, SurfaceFormats, VulkanError, VulkanResult,
};
pub use device::VulkanDevice;
pub use framebuffer::Framebuffer;
pub use image::{Image, ImageConfig, ImageView, ImageViewSampler, SamplerConfig};
pub use pipeline::{DescriptorSetLayout, GraphicsPipelineDesc, Pipeline, PipelineLayout, ShaderStageDesc};
pub use render_pass::{RenderPassDescription, RenderPassHandle, SubpassDescription};
pub use shader::{ShaderManager, ShaderProvider};
pub use transitions::{format_texel_size, has_stencil, transition_masks, TransitionMasks};
pub use util::{
    copy_buffer_to_image, create_image, create_image_and_view, create_image_mipmaps, create_image_view_sampler,
    mip_level_count, transition_image_layout,
};
