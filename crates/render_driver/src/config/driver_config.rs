//! # Driver Configuration
//!
//! Application metadata, validation settings and the few tunables the driver
//! exposes. Frames in flight are fixed at compile time and are not configurable.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{Config, ConfigError};

/// Configuration consumed by [`crate::RenderDriver`] and [`crate::vulkan::instance::InstanceContext`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Whether to enable Vulkan validation layers; `None` follows the build type
    pub enable_validation: Option<bool>,
    /// Directory searched for `{name}.vert.spv` / `{name}.frag.spv`
    pub shader_dir: PathBuf,
    /// Clear color of the rendering scope (RGBA)
    pub clear_color: [f32; 4],
    /// Extent used when the surface leaves the choice to the swapchain
    pub fallback_extent: (u32, u32),
}

impl DriverConfig {
    /// Create a new driver configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            enable_validation: None,
            shader_dir: PathBuf::from("."),
            clear_color: [0.5, 0.5, 0.5, 1.0],
            fallback_extent: (800, 600),
        }
    }

    /// Set application version
    #[must_use]
    pub const fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Enable or disable validation layers
    #[must_use]
    pub const fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set the shader directory
    #[must_use]
    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = dir.into();
        self
    }

    /// Set the clear color
    #[must_use]
    pub const fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Set the fallback extent
    #[must_use]
    pub const fn with_fallback_extent(mut self, width: u32, height: u32) -> Self {
        self.fallback_extent = (width, height);
        self
    }

    /// Whether validation should be requested for this build
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Packed application version for `VkApplicationInfo`
    pub const fn packed_version(&self) -> u32 {
        let (major, minor, patch) = self.application_version;
        ash::vk::make_api_version(0, major, minor, patch)
    }

    /// Shader directory as a path
    pub fn shader_dir(&self) -> &Path {
        &self.shader_dir
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }

        if self.application_name.contains('\0') {
            return Err(ConfigError::Invalid(
                "Application name cannot contain NUL bytes".to_string(),
            ));
        }

        if self.fallback_extent.0 == 0 || self.fallback_extent.1 == 0 {
            return Err(ConfigError::Invalid(
                "Fallback extent must be non-zero".to_string(),
            ));
        }

        if self.clear_color.iter().any(|c| !c.is_finite()) {
            return Err(ConfigError::Invalid("Clear color must be finite".to_string()));
        }

        Ok(())
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::new("Render Driver Application")
    }
}

impl Config for DriverConfig {
    fn check(&self) -> Result<(), ConfigError> {
        self.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("render_driver_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_defaults_match_frame_protocol() {
        let config = DriverConfig::default();
        assert_eq!(config.clear_color, [0.5, 0.5, 0.5, 1.0]);
        assert_eq!(config.shader_dir(), Path::new("."));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let config = DriverConfig::new("triangle")
            .with_version(2, 1, 0)
            .with_validation(false)
            .with_shader_dir("shaders")
            .with_fallback_extent(1280, 720);

        assert_eq!(config.application_version, (2, 1, 0));
        assert!(!config.validation_enabled());
        assert_eq!(config.shader_dir(), Path::new("shaders"));
        assert_eq!(config.fallback_extent, (1280, 720));
        assert_eq!(config.packed_version(), ash::vk::make_api_version(0, 2, 1, 0));
    }

    #[test]
    fn test_validation_follows_build_type_when_unset() {
        let config = DriverConfig::default();
        assert_eq!(config.validation_enabled(), cfg!(debug_assertions));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(DriverConfig::new("").validate().is_err());
        assert!(DriverConfig::new("a\0b").validate().is_err());
        assert!(DriverConfig::default().with_fallback_extent(0, 600).validate().is_err());
        assert!(DriverConfig::default()
            .with_clear_color([f32::NAN, 0.0, 0.0, 1.0])
            .validate()
            .is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let path = temp_path("config.toml");
        let path_str = path.to_string_lossy().to_string();
        let config = DriverConfig::new("roundtrip").with_validation(true);

        config.save_to_file(&path_str).unwrap();
        let loaded = DriverConfig::load_from_file(&path_str).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_ron_round_trip() {
        let path = temp_path("config.ron");
        let path_str = path.to_string_lossy().to_string();
        let config = DriverConfig::new("roundtrip").with_clear_color([0.0, 0.0, 0.0, 1.0]);

        config.save_to_file(&path_str).unwrap();
        let loaded = DriverConfig::load_from_file(&path_str).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: DriverConfig = toml::from_str("application_name = \"partial\"").unwrap();
        assert_eq!(config.application_name, "partial");
        assert_eq!(config.clear_color, DriverConfig::default().clear_color);
    }

    #[test]
    fn test_unsupported_format() {
        let result = DriverConfig::default().save_to_file("driver.json");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_invalid_file_is_rejected_on_load() {
        let path = temp_path("zero_extent.toml");
        let path_str = path.to_string_lossy().to_string();
        std::fs::write(&path, "fallback_extent = [0, 600]\n").unwrap();

        let result = DriverConfig::load_from_file(&path_str);
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_file_names_path() {
        let path = temp_path("broken.toml");
        let path_str = path.to_string_lossy().to_string();
        std::fs::write(&path, "application_name = ").unwrap();

        let result = DriverConfig::load_from_file(&path_str);
        std::fs::remove_file(&path).ok();

        match result {
            Err(ConfigError::Parse { path, .. }) => assert_eq!(path, path_str),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let path = temp_path("missing.toml");
        let loaded = DriverConfig::load_or_default(&path.to_string_lossy()).unwrap();
        assert_eq!(loaded, DriverConfig::default());
    }
}
