//! Persisted assets produced or consumed by render passes

pub mod store;
pub mod texture;

pub use store::{AssetSink, FileAssetStore, MemoryAssetStore};
pub use texture::{AddressMode, PixelType, Texture2D, TextureType};

/// Asset persistence errors
#[derive(thiserror::Error, Debug)]
pub enum AssetError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata could not be written
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Metadata could not be read back
    #[error("Parse error: {0}")]
    Parse(String),

    /// Texture contents disagree with its metadata
    #[error("Invalid texture {url}: {reason}")]
    InvalidTexture {
        /// Logical asset identifier
        url: String,
        /// What is wrong
        reason: String,
    },
}
