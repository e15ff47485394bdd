//! Device context contract
//!
//! Every resource-layer call goes through a [`GpuDevice`] passed explicitly as a
//! [`DeviceRef`]. The production implementation lives in `device.rs`; tests use a
//! recording mock. Creation calls are fallible and return [`VulkanResult`]; the
//! caller decides whether an error terminates the process.

use ash::vk;
use std::sync::Arc;
use thiserror::Error;

use crate::assets::AssetError;
use crate::render::vulkan::commands::Command;
use crate::render::vulkan::image::{ImageConfig, SamplerConfig};
use crate::render::vulkan::pipeline::GraphicsPipelineDesc;
use crate::render::vulkan::render_pass::RenderPassDescription;

slotmap::new_key_type! {
    /// Opaque key of a device memory allocation owned by the device context
    pub struct AllocationKey;
}

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// A device call failed
    #[error("failed to {op}, error: {result:?}")]
    Api {
        /// Name of the operation that failed
        op: &'static str,
        /// Device error code
        result: vk::Result,
    },

    /// The memory allocator refused a request
    #[error("failed to allocate memory for {op}, error: {result:?}")]
    Allocation {
        /// Name of the operation that failed
        op: &'static str,
        /// Allocator error code
        result: vk::Result,
    },

    /// Layout transition pair missing from the transition table
    #[error("unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedTransition {
        /// Current layout
        old: vk::ImageLayout,
        /// Requested layout
        new: vk::ImageLayout,
    },

    /// Format lacks a capability required by the operation
    #[error("unsupported format {format:?}: {reason}")]
    UnsupportedFormat {
        /// Offending format
        format: vk::Format,
        /// Missing capability
        reason: String,
    },

    /// Render pass description failed validation
    #[error("invalid render pass description: {0}")]
    InvalidRenderPass(String),

    /// Framebuffer attachment count differs from the render pass
    #[error("framebuffer expects {expected} attachments, got {actual}")]
    AttachmentMismatch {
        /// Attachment count of the render pass
        expected: usize,
        /// Number of views supplied
        actual: usize,
    },

    /// Framebuffer view format differs from the render pass attachment
    #[error("attachment {index} expects format {expected:?}, view has {actual:?}")]
    AttachmentFormatMismatch {
        /// Attachment slot
        index: usize,
        /// Format declared by the render pass
        expected: vk::Format,
        /// Format of the supplied view
        actual: vk::Format,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Shader stage lookup failed
    #[error("shader error: {0}")]
    Shader(String),

    /// Asset persistence failed
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),
}

impl VulkanError {
    /// Adapter for `map_err` on raw device calls
    pub fn api(op: &'static str) -> impl Fn(vk::Result) -> Self {
        move |result| Self::Api { op, result }
    }

    /// Adapter for `map_err` on allocator calls
    pub fn allocation(op: &'static str) -> impl Fn(vk::Result) -> Self {
        move |result| Self::Allocation { op, result }
    }

    /// Shorthand for [`VulkanError::InvalidOperation`]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidOperation { reason: reason.into() }
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Shared handle to the device context
pub type DeviceRef = Arc<dyn GpuDevice>;

/// Memory placement hint forwarded to the allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryUsage {
    /// Device-local memory, never mapped
    DeviceLocal,
    /// Host-visible memory written sequentially by the CPU (upload staging)
    HostUpload,
    /// Host-visible memory read back by the CPU (readback staging)
    HostReadback,
}

/// Surface formats negotiated by the swapchain owner
#[derive(Debug, Clone, Copy)]
pub struct SurfaceFormats {
    /// Format of color render targets
    pub color: vk::Format,
    /// Format of depth-stencil render targets
    pub depth: vk::Format,
}

/// Device, allocator and queue access shared by every pass
///
/// Implementations are used from the single rendering thread only; creation and
/// destruction never run concurrently with command recording.
pub trait GpuDevice {
    /// Formats negotiated for the presentation surface
    fn surface_formats(&self) -> SurfaceFormats;

    /// Allocate a buffer of at least `size` bytes
    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory: MemoryUsage,
    ) -> VulkanResult<(vk::Buffer, AllocationKey)>;
    /// Release a buffer together with its allocation
    fn destroy_buffer(&self, buffer: vk::Buffer, allocation: AllocationKey);

    /// Allocate a 2D image
    fn create_image(&self, config: &ImageConfig) -> VulkanResult<(vk::Image, AllocationKey)>;
    /// Release an image together with its allocation
    fn destroy_image(&self, image: vk::Image, allocation: AllocationKey);

    /// Create a 2D view covering `mip_levels` levels of `image`
    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        mip_levels: u32,
    ) -> VulkanResult<vk::ImageView>;
    /// Destroy an image view
    fn destroy_image_view(&self, view: vk::ImageView);

    /// Create a sampler
    fn create_sampler(&self, config: &SamplerConfig) -> VulkanResult<vk::Sampler>;
    /// Destroy a sampler
    fn destroy_sampler(&self, sampler: vk::Sampler);

    /// Map an allocation into host address space
    fn map_memory(&self, allocation: AllocationKey) -> VulkanResult<*mut u8>;
    /// Unmap a previously mapped allocation
    fn unmap_memory(&self, allocation: AllocationKey);
    /// Layout of mip 0 / layer 0 of a linear-tiled image
    fn image_subresource_layout(
        &self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
    ) -> vk::SubresourceLayout;
    /// Whether optimal-tiled images of `format` can be blitted with linear filtering
    fn supports_linear_blit(&self, format: vk::Format) -> bool;

    /// Create a render pass from a validated description
    fn create_render_pass(&self, desc: &RenderPassDescription) -> VulkanResult<vk::RenderPass>;
    /// Destroy a render pass
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    /// Create a framebuffer binding `attachments` to `render_pass`
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        width: u32,
        height: u32,
    ) -> VulkanResult<vk::Framebuffer>;
    /// Destroy a framebuffer
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    /// Create a descriptor set layout
    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> VulkanResult<vk::DescriptorSetLayout>;
    /// Destroy a descriptor set layout
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    /// Create a pipeline layout
    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> VulkanResult<vk::PipelineLayout>;
    /// Destroy a pipeline layout
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    /// Create a graphics pipeline
    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> VulkanResult<vk::Pipeline>;
    /// Destroy a pipeline
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    /// Create a shader module from SPIR-V words
    fn create_shader_module(&self, code: &[u32]) -> VulkanResult<vk::ShaderModule>;
    /// Destroy a shader module
    fn destroy_shader_module(&self, module: vk::ShaderModule);

    /// Allocate and begin a one-time-submit command buffer
    fn begin_instant_commands(&self) -> VulkanResult<vk::CommandBuffer>;
    /// Submit the command buffer and block until the device has executed it
    fn end_instant_commands(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()>;
    /// Free an instant command buffer without submitting it
    fn abandon_instant_commands(&self, command_buffer: vk::CommandBuffer);

    /// Record one command into `command_buffer`
    fn record(&self, command_buffer: vk::CommandBuffer, command: &Command);
}
