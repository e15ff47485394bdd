//! Asset root discovery and path helpers
//!
//! Engine paths are written relative to the asset root (`shader/spv`,
//! `engine/texture/ibl/brdf_lut.tex`). The root is the first `asset/`
//! directory found in the working directory or one of its parents.

use std::path::{Path, PathBuf};

/// Parent directories searched above the starting directory
const SEARCH_DEPTH: usize = 4;

/// Path resolution rooted at the asset directory
#[derive(Debug, Clone)]
pub struct FileSystem {
    asset_root: PathBuf,
}

impl FileSystem {
    /// Use `asset_root` as is
    pub fn new(asset_root: impl Into<PathBuf>) -> Self {
        Self {
            asset_root: asset_root.into(),
        }
    }

    /// Search `asset/` from the current working directory upwards
    pub fn discover() -> std::io::Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::discover_from(&cwd).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no asset directory found above {}", cwd.display()),
            )
        })
    }

    /// Search `asset/` from `start` upwards
    pub fn discover_from(start: &Path) -> Option<Self> {
        start
            .ancestors()
            .take(SEARCH_DEPTH + 1)
            .map(|dir| dir.join("asset"))
            .find(|candidate| candidate.is_dir())
            .map(|asset_root| {
                log::debug!("Asset root: {}", asset_root.display());
                Self { asset_root }
            })
    }

    /// Asset root directory
    pub fn asset_root(&self) -> &Path {
        &self.asset_root
    }

    /// Resolve `path` against the asset root; absolute paths pass through
    pub fn absolute(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.asset_root.join(path)
        }
    }

    /// Extension without the dot, empty when there is none
    pub fn extension(path: impl AsRef<Path>) -> String {
        path.as_ref()
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name without its extension
    pub fn basename(path: impl AsRef<Path>) -> String {
        path.as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name with its extension
    pub fn filename(path: impl AsRef<Path>) -> String {
        path.as_ref()
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Parent directory
    pub fn dir(path: impl AsRef<Path>) -> PathBuf {
        path.as_ref().parent().map(Path::to_path_buf).unwrap_or_default()
    }

    /// Whether `path` exists below the asset root
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.absolute(path).exists()
    }

    /// Create `path` and its parents below the asset root
    pub fn create_dirs(&self, path: impl AsRef<Path>) -> std::io::Result<PathBuf> {
        let dir = self.absolute(path);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}
