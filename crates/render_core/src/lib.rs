//! # Render Core
//!
//! Render-pass execution core of a Vulkan renderer: GPU resource ownership,
//! the render pass lifecycle and the passes built on it.
//!
//! ## Layers
//!
//! - **Resource layer** (`render::vulkan`): RAII wrappers for buffers, images,
//!   views, samplers, framebuffers and pipelines, layout transitions, one-shot
//!   command submission and the [`GpuDevice`](render::vulkan::GpuDevice)
//!   context every call goes through.
//! - **Passes** (`render::pass`): the [`RenderPass`](render::pass::RenderPass)
//!   lifecycle, a color + depth base pass and the BRDF lookup table pass.
//! - **Orchestration** (`render::pipeline`): runs passes in order per frame
//!   and on resize.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use render_core::prelude::*;
//!
//! fn bake() -> Result<(), Box<dyn std::error::Error>> {
//!     let device: DeviceRef = Arc::new(VulkanDevice::new_headless("lut_baker", false)?);
//!     let shaders = Arc::new(ShaderManager::new(&device, "asset/shader/spv"));
//!     let mut pass = BrdfLutPass::new(&device, shaders, "asset/engine/texture/ibl/brdf_lut.tex");
//!     pass.init()?;
//!     pass.create_resizable_objects(512, 512)?;
//!     pass.render(&FileAssetStore::new("."))?;
//!     pass.destroy();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod assets;
pub mod config;
pub mod foundation;
pub mod platform;
pub mod render;

/// Common imports
pub mod prelude {
    pub use crate::assets::{AssetError, AssetSink, FileAssetStore, PixelType, Texture2D, TextureType};
    pub use crate::config::{Config, ConfigError, RenderCoreConfig};
    pub use crate::foundation::time::Stopwatch;
    pub use crate::platform::FileSystem;
    pub use crate::render::pass::{BasePass, BrdfLutPass, FrameContext, PassState, RenderPass};
    pub use crate::render::pipeline::PassPipeline;
    pub use crate::render::vulkan::{
        DeviceRef, GpuDevice, ShaderManager, ShaderProvider, VulkanDevice, VulkanError, VulkanResult,
    };
}
