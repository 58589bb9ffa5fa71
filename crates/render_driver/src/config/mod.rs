//! Driver configuration files
//!
//! Settings live in TOML or RON, picked by file extension. Anything loaded
//! from disk goes through [`Config::check`] before it reaches the driver, so
//! a bad file fails at load time rather than at device creation.

use std::path::Path;

pub use serde::{Deserialize, Serialize};

mod driver_config;

pub use driver_config::DriverConfig;

/// On-disk encodings a configuration can use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.toml`
    Toml,
    /// `.ron`
    Ron,
}

impl ConfigFormat {
    /// Encoding implied by the extension of `path`
    pub fn from_path(path: &str) -> Result<Self, ConfigError> {
        match Path::new(path).extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.to_string())),
        }
    }
}

/// Serializable settings with file persistence
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Reject values that parsed but cannot be used
    fn check(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Parse and check the settings stored at `path`
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let format = ConfigFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;

        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_string(),
            message,
        };
        let config: Self = match format {
            ConfigFormat::Toml => toml::from_str(&contents).map_err(|e| parse_error(e.to_string()))?,
            ConfigFormat::Ron => ron::from_str(&contents).map_err(|e| parse_error(e.to_string()))?,
        };

        config.check()?;
        log::debug!("Loaded {:?} configuration from {}", format, path);
        Ok(config)
    }

    /// Like [`Config::load_from_file`], with defaults when nothing exists at `path`
    fn load_or_default(path: &str) -> Result<Self, ConfigError> {
        if Path::new(path).exists() {
            Self::load_from_file(path)
        } else {
            log::debug!("No configuration at {}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Write the settings to `path` in the encoding its extension names
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?,
            ConfigFormat::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };

        std::fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })
    }
}

/// Failures loading, saving or checking driver settings
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The file could not be read or written
    #[error("Cannot access driver config {path}: {source}")]
    Io {
        /// File involved
        path: String,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// The file is not valid for its encoding
    #[error("Malformed driver config {path}: {message}")]
    Parse {
        /// File involved
        path: String,
        /// Parser message
        message: String,
    },

    /// The settings could not be encoded
    #[error("Cannot encode driver config: {0}")]
    Serialize(String),

    /// Extension is neither `.toml` nor `.ron`
    #[error("Driver config must be .toml or .ron: {0}")]
    UnsupportedFormat(String),

    /// Values parsed but are not usable
    #[error("Invalid driver config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_follows_extension() {
        assert_eq!(ConfigFormat::from_path("driver.toml").unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path("dir.v2/driver.ron").unwrap(), ConfigFormat::Ron);
        assert!(matches!(
            ConfigFormat::from_path("driver.toml.bak"),
            Err(ConfigError::UnsupportedFormat(_))
        ));
        assert!(ConfigFormat::from_path("driver").is_err());
    }
}
