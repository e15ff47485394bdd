//! Shader module loading
//!
//! Passes ask a [`ShaderProvider`] for a stage by name (`"brdf_lut.vert"`) and
//! stage kind. [`ShaderManager`] resolves names to `<shader_dir>/<name>.spv`,
//! loads the SPIR-V once and keeps the module until it is dropped.

use ash::vk;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::render::vulkan::pipeline::ShaderStageDesc;
use crate::render::vulkan::{DeviceRef, VulkanError, VulkanResult};

/// Source of ready-to-bind shader stages
pub trait ShaderProvider {
    /// Look up the module for `name` and pair it with `stage`
    fn shader_stage(&self, name: &str, stage: vk::ShaderStageFlags) -> VulkanResult<ShaderStageDesc>;
}

/// Caching SPIR-V loader
pub struct ShaderManager {
    device: DeviceRef,
    shader_dir: PathBuf,
    modules: RefCell<HashMap<String, vk::ShaderModule>>,
}

impl ShaderManager {
    /// Loader reading modules from `shader_dir`
    pub fn new(device: &DeviceRef, shader_dir: impl Into<PathBuf>) -> Self {
        Self {
            device: device.clone(),
            shader_dir: shader_dir.into(),
            modules: RefCell::new(HashMap::new()),
        }
    }

    /// Directory modules are read from
    pub fn shader_dir(&self) -> &Path {
        &self.shader_dir
    }

    /// Register SPIR-V words under `name`, replacing any earlier module
    pub fn insert_spirv(&self, name: &str, code: &[u32]) -> VulkanResult<()> {
        let module = self.device.create_shader_module(code)?;
        if let Some(old) = self.modules.borrow_mut().insert(name.to_string(), module) {
            self.device.destroy_shader_module(old);
        }
        Ok(())
    }

    /// Number of cached modules
    pub fn len(&self) -> usize {
        self.modules.borrow().len()
    }

    /// Whether nothing is cached yet
    pub fn is_empty(&self) -> bool {
        self.modules.borrow().is_empty()
    }

    fn load(&self, name: &str) -> VulkanResult<vk::ShaderModule> {
        if let Some(module) = self.modules.borrow().get(name) {
            return Ok(*module);
        }

        let path = self.shader_dir.join(format!("{}.spv", name));
        let mut file = File::open(&path)
            .map_err(|e| VulkanError::Shader(format!("failed to open {}: {}", path.display(), e)))?;
        let code = ash::util::read_spv(&mut file)
            .map_err(|e| VulkanError::Shader(format!("failed to read {}: {}", path.display(), e)))?;
        let module = self.device.create_shader_module(&code)?;
        log::debug!("Loaded shader {} ({} words)", name, code.len());

        self.modules.borrow_mut().insert(name.to_string(), module);
        Ok(module)
    }
}

impl ShaderProvider for ShaderManager {
    fn shader_stage(&self, name: &str, stage: vk::ShaderStageFlags) -> VulkanResult<ShaderStageDesc> {
        let module = self.load(name)?;
        Ok(ShaderStageDesc { stage, module })
    }
}

impl Drop for ShaderManager {
    fn drop(&mut self) {
        for (_, module) in self.modules.get_mut().drain() {
            self.device.destroy_shader_module(module);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::testing::{MockDevice, ObjectKind};
    use std::io::Write;
    use std::sync::Arc;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn test_registered_module_is_reused() {
        let mock = Arc::new(MockDevice::new());
        let device: DeviceRef = mock.clone();
        let shaders = ShaderManager::new(&device, "unused");
        shaders.insert_spirv("fullscreen.vert", &[SPIRV_MAGIC]).unwrap();

        let a = shaders.shader_stage("fullscreen.vert", vk::ShaderStageFlags::VERTEX).unwrap();
        let b = shaders.shader_stage("fullscreen.vert", vk::ShaderStageFlags::VERTEX).unwrap();
        assert_eq!(a.module, b.module);
        assert_eq!(mock.created(ObjectKind::ShaderModule), 1);

        drop(shaders);
        assert_eq!(mock.live(ObjectKind::ShaderModule), 0);
    }

    #[test]
    fn test_missing_file_is_shader_error() {
        let mock = Arc::new(MockDevice::new());
        let device: DeviceRef = mock.clone();
        let shaders = ShaderManager::new(&device, std::env::temp_dir().join("render_core_no_such_dir"));
        let err = shaders.shader_stage("missing.frag", vk::ShaderStageFlags::FRAGMENT).unwrap_err();
        assert!(matches!(err, VulkanError::Shader(_)));
        assert!(shaders.is_empty());
    }

    #[test]
    fn test_loads_spirv_from_disk() {
        let dir = std::env::temp_dir().join(format!("render_core_shader_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut file = File::create(dir.join("quad.frag.spv")).unwrap();
        file.write_all(&SPIRV_MAGIC.to_le_bytes()).unwrap();
        file.write_all(&0u32.to_le_bytes()).unwrap();
        drop(file);

        let mock = Arc::new(MockDevice::new());
        let device: DeviceRef = mock.clone();
        let shaders = ShaderManager::new(&device, &dir);
        let stage = shaders.shader_stage("quad.frag", vk::ShaderStageFlags::FRAGMENT).unwrap();
        assert_eq!(stage.stage, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(shaders.len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
