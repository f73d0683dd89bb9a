//! Configuration management for Dissimilar.
//!
//! Configuration is loaded from the platform config directory
//! (e.g. `~/.config/dissimilar/config.toml` on Linux) with defaults that
//! match the legacy tool. All sections implement `Default` and deserialize
//! with `#[serde(default)]`, so a partial file is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Resource limits
    pub limits: LimitsConfig,

    /// SSIM computation settings
    pub ssim: SsimConfig,

    /// External decoder settings (JPEG2000 etc.)
    pub decoder: DecoderConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Decode timeout in milliseconds (applies to native and external decodes)
    pub decode_timeout_ms: u64,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            decode_timeout_ms: 30000,
            max_image_dimension: 30000,
        }
    }
}

/// SSIM computation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SsimConfig {
    /// Window size in pixels (windows at the right/bottom edge are clipped)
    pub window_size: u32,

    /// Render a per-window heatmap while processing pairs
    pub heatmaps: bool,
}

impl Default for SsimConfig {
    fn default() -> Self {
        Self {
            window_size: crate::metrics::SSIM_WINDOW_SIZE,
            heatmaps: true,
        }
    }
}

/// External decoder subprocess settings.
///
/// When `command` is set, files whose extension appears in `extensions`
/// are decoded by running `command <input> <output.png>` and reading the
/// resulting PNG. Everything else goes through the native decoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Decoder executable, e.g. "opj_decompress_wrapper"
    pub command: Option<String>,

    /// Lower-case extensions routed to the external decoder
    pub extensions: Vec<String>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            command: None,
            extensions: vec!["jp2".to_string(), "j2k".to_string()],
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Falls back to `~/.dissimilar/config.toml` if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("uk", "bl-dpt", "dissimilar")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".dissimilar").join("config.toml")
            })
    }

    /// Check that configured values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssim.window_size == 0 {
            return Err(ConfigError::Validation(
                "ssim.window_size must be at least 1".to_string(),
            ));
        }
        if self.limits.decode_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "limits.decode_timeout_ms must be non-zero".to_string(),
            ));
        }
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::Validation(format!(
                    "unknown logging.level: {other}"
                )))
            }
        }
        Ok(())
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Validation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.ssim.window_size, 8);
        assert!(config.ssim.heatmaps);
        assert_eq!(config.limits.decode_timeout_ms, 30000);
        assert!(config.decoder.command.is_none());
        assert!(config.decoder.extensions.contains(&"jp2".to_string()));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str("[ssim]\nwindow_size = 16\n").unwrap();
        assert_eq!(config.ssim.window_size, 16);
        assert_eq!(config.limits.decode_timeout_ms, 30000);
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = Config::default();
        config.ssim.window_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let toml_str = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.ssim.window_size, config.ssim.window_size);
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(Config::load_from(&path).is_err());
    }
}
