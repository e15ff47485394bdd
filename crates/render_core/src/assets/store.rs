//! Texture persistence
//!
//! A texture is stored as two blobs: RON metadata under its url and the raw
//! pixel bytes under `<url>.bin`.

use ron::ser::PrettyConfig;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::assets::{AssetError, Texture2D};

/// Receiver of fully populated texture assets
pub trait AssetSink {
    /// Persist `texture` under its url
    fn serialize_asset(&self, texture: &Texture2D) -> Result<(), AssetError>;
}

fn encode_metadata(texture: &Texture2D) -> Result<String, AssetError> {
    ron::ser::to_string_pretty(texture, PrettyConfig::default()).map_err(|e| AssetError::Serialize(e.to_string()))
}

fn decode(metadata: &str, image_data: Vec<u8>) -> Result<Texture2D, AssetError> {
    let mut texture: Texture2D = ron::from_str(metadata).map_err(|e| AssetError::Parse(e.to_string()))?;
    texture.image_data = image_data;
    texture.validate()?;
    Ok(texture)
}

/// Asset store rooted at a directory
pub struct FileAssetStore {
    root: PathBuf,
}

impl FileAssetStore {
    /// Store writing below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn metadata_path(&self, url: &str) -> PathBuf {
        self.root.join(url)
    }

    fn data_path(&self, url: &str) -> PathBuf {
        self.root.join(format!("{}.bin", url))
    }

    /// Read a texture back, without GPU data
    pub fn load_texture(&self, url: &str) -> Result<Texture2D, AssetError> {
        let metadata = std::fs::read_to_string(self.metadata_path(url))?;
        let image_data = std::fs::read(self.data_path(url))?;
        decode(&metadata, image_data)
    }
}

impl AssetSink for FileAssetStore {
    fn serialize_asset(&self, texture: &Texture2D) -> Result<(), AssetError> {
        texture.validate()?;
        let metadata_path = self.metadata_path(&texture.url);
        if let Some(dir) = metadata_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&metadata_path, encode_metadata(texture)?)?;
        std::fs::write(self.data_path(&texture.url), &texture.image_data)?;
        log::info!("Saved texture {} to {}", texture.url, metadata_path.display());
        Ok(())
    }
}

/// Asset store keeping serialized textures in memory
#[derive(Default)]
pub struct MemoryAssetStore {
    entries: RefCell<HashMap<String, (String, Vec<u8>)>>,
}

impl MemoryAssetStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `url` has been stored
    pub fn contains(&self, url: &str) -> bool {
        self.entries.borrow().contains_key(url)
    }

    /// Number of stored assets
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether nothing has been stored
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Read a texture back, without GPU data
    pub fn load_texture(&self, url: &str) -> Result<Texture2D, AssetError> {
        let entries = self.entries.borrow();
        let (metadata, image_data) = entries.get(url).ok_or_else(|| AssetError::InvalidTexture {
            url: url.to_string(),
            reason: "not stored".to_string(),
        })?;
        decode(metadata, image_data.clone())
    }
}

impl AssetSink for MemoryAssetStore {
    fn serialize_asset(&self, texture: &Texture2D) -> Result<(), AssetError> {
        texture.validate()?;
        let metadata = encode_metadata(texture)?;
        self.entries
            .borrow_mut()
            .insert(texture.url.clone(), (metadata, texture.image_data.clone()));
        Ok(())
    }
}
