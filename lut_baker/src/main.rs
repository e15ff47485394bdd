//! BRDF lookup table baker
//!
//! Brings up a headless Vulkan device, runs the BRDF LUT pass once and writes
//! the texture below the project root.
//!
//! Usage: `lut_baker [config.toml|config.ron]` (defaults to `render_core.toml`
//! when present).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use render_core::config::{Config, ConfigError, RenderCoreConfig};
use render_core::foundation::logging;
use render_core::prelude::*;

const DEFAULT_CONFIG: &str = "render_core.toml";

fn load_config(path: Option<String>) -> Result<RenderCoreConfig, ConfigError> {
    match path {
        Some(path) => RenderCoreConfig::load_from_file(&path),
        None if Path::new(DEFAULT_CONFIG).exists() => RenderCoreConfig::load_from_file(DEFAULT_CONFIG),
        None => Ok(RenderCoreConfig::default()),
    }
}

fn file_system(config: &RenderCoreConfig) -> std::io::Result<FileSystem> {
    match &config.asset_root {
        Some(root) => Ok(FileSystem::new(root)),
        None => FileSystem::discover(),
    }
}

fn bake(config: &RenderCoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    let fs = file_system(config)?;
    // Asset urls carry the `asset/` prefix, so the store sits one level up.
    let project_root: PathBuf = fs
        .asset_root()
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let store = FileAssetStore::new(project_root);

    log::info!("Creating Vulkan device...");
    let device: DeviceRef = Arc::new(VulkanDevice::new_headless(
        &config.application_name,
        config.enable_validation,
    )?);
    let shaders = Arc::new(ShaderManager::new(&device, fs.absolute(&config.shader_dir)));

    let size = config.brdf_lut.size;
    let mut pass = BrdfLutPass::new(&device, shaders, config.brdf_lut.url.clone());
    let result = pass
        .init()
        .and_then(|()| pass.create_resizable_objects(size, size))
        .and_then(|()| pass.render(&store));
    let texture = match result {
        Ok(texture) => texture,
        Err(e) => {
            pass.destroy();
            return Err(e.into());
        }
    };
    log::info!(
        "Baked {}x{} {} lookup table to {}",
        texture.width,
        texture.height,
        texture.pixel_type,
        store.root().join(&texture.url).display()
    );

    drop(texture);
    pass.destroy();
    Ok(())
}

fn main() {
    let config = load_config(std::env::args().nth(1));
    let filter = config
        .as_ref()
        .map_or(logging::DEFAULT_FILTER, |config| config.log_filter.as_str());
    logging::init_with_filter(filter);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            log::error!("failed to load config, error: {}", e);
            std::process::exit(1);
        }
    };

    log::info!("Starting BRDF LUT baker");
    if let Err(e) = bake(&config) {
        log::error!("{}", e);
        std::process::exit(1);
    }
    log::info!("BRDF LUT baker finished");
}
