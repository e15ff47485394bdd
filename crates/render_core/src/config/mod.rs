//! Configuration system

pub use serde::{Deserialize, Serialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, Default::default()).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Base pass settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasePassConfig {
    /// Color attachment clear value
    pub clear_color: [f32; 4],
}

impl Default for BasePassConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.3, 0.0, 1.0],
        }
    }
}

/// BRDF lookup table settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrdfLutConfig {
    /// Edge length of the square table
    pub size: u32,
    /// Asset url the table is saved under
    pub url: String,
}

impl Default for BrdfLutConfig {
    fn default() -> Self {
        Self {
            size: 512,
            url: "asset/engine/texture/ibl/brdf_lut.tex".to_string(),
        }
    }
}

/// Top-level settings of the render core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderCoreConfig {
    /// Name reported to the driver
    pub application_name: String,
    /// `env_logger` filter used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Enable the Khronos validation layer when installed
    pub enable_validation: bool,
    /// Asset root override; discovered from the working directory when unset
    pub asset_root: Option<String>,
    /// SPIR-V directory relative to the asset root
    pub shader_dir: String,
    /// Base pass settings
    pub base_pass: BasePassConfig,
    /// BRDF lookup table settings
    pub brdf_lut: BrdfLutConfig,
}

impl Default for RenderCoreConfig {
    fn default() -> Self {
        Self {
            application_name: "render_core".to_string(),
            log_filter: "info".to_string(),
            enable_validation: cfg!(debug_assertions),
            asset_root: None,
            shader_dir: "shader/spv".to_string(),
            base_pass: BasePassConfig::default(),
            brdf_lut: BrdfLutConfig::default(),
        }
    }
}

impl Config for RenderCoreConfig {}
