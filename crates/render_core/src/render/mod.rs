//! Rendering
//!
//! - `vulkan`: device resource layer
//! - `pass`: render pass lifecycle and the concrete passes
//! - `pipeline`: per-frame sequencing of passes

pub mod pass;
pub mod pipeline;
pub mod vulkan;

pub use pass::{BasePass, BrdfLutPass, FrameContext, PassBase, PassState, RenderPass};
pub use pipeline::PassPipeline;
