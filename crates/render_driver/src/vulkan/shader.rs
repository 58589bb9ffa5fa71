//! SPIR-V shader loading
//!
//! Compiled shaders are looked up by name as `{name}.{stage}.spv` inside the
//! configured shader directory. Compilation happens offline.

use ash::{vk, Device};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{DriverError, DriverResult};

/// Pipeline stage a compiled shader belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Fragment shader
    Fragment,
}

impl ShaderStage {
    /// File-name infix for this stage
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::Fragment => "frag",
        }
    }

    /// Vulkan stage flag
    pub const fn flags(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// Path of the compiled shader `name` for `stage` under `dir`
pub fn shader_path(dir: &Path, name: &str, stage: ShaderStage) -> PathBuf {
    dir.join(format!("{name}.{}.spv", stage.suffix()))
}

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V words
    pub fn from_words(device: Device, words: &[u32]) -> DriverResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(words);

        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(DriverError::allocation("shader module"))?
        };

        Ok(Self { device, module })
    }

    /// Load shader from SPIR-V file
    pub fn from_file(device: Device, path: &Path) -> DriverResult<Self> {
        let load_error = |source| DriverError::ShaderLoad {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(load_error)?;
        let words = ash::util::read_spv(&mut file).map_err(load_error)?;
        log::debug!("Loaded shader {:?} ({} bytes)", path, words.len() * 4);

        Self::from_words(device, &words)
    }

    /// Get shader module handle
    pub const fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_path_convention() {
        let dir = Path::new(".");
        assert_eq!(
            shader_path(dir, "simple", ShaderStage::Vertex),
            Path::new("./simple.vert.spv")
        );
        assert_eq!(
            shader_path(Path::new("shaders"), "simple", ShaderStage::Fragment),
            Path::new("shaders/simple.frag.spv")
        );
    }

    #[test]
    fn test_stage_flags() {
        assert_eq!(ShaderStage::Vertex.flags(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(ShaderStage::Fragment.flags(), vk::ShaderStageFlags::FRAGMENT);
    }
}
