// Configuration - load RHI settings from rhi.toml
//
// Provides sensible defaults if the config file is missing or has errors.

use serde::Deserialize;
use std::path::Path;

use crate::error::{RhiError, RhiResult};
use crate::format::PresentMode;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct RhiConfig {
    pub app: AppConfig,
    pub present: PresentConfig,
    pub debug: DebugConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "vk-rhi application".to_string(),
        }
    }
}

/// Presentation defaults. A window can override the present mode through its
/// `WindowSpec`; the buffer count is the requested swapchain image count
/// before clamping against surface capabilities.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PresentConfig {
    pub mode: String,
    pub buffer_count: u32,
}

impl Default for PresentConfig {
    fn default() -> Self {
        Self {
            mode: "fifo".to_string(),
            buffer_count: 3,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
        }
    }
}

impl RhiConfig {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("rhi.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load rhi.toml: {}. Using defaults.", e);
            RhiConfig::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> RhiResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(RhiConfig::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| RhiError::Validation(format!("failed to read {:?}: {}", path, e)))?;

        let config: RhiConfig = toml::from_str(&content)
            .map_err(|e| RhiError::Validation(format!("failed to parse {:?}: {}", path, e)))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Default present mode from the config string
    pub fn present_mode(&self) -> PresentMode {
        match self.present.mode.to_lowercase().as_str() {
            "immediate" => PresentMode::Immediate,
            "mailbox" => PresentMode::Mailbox,
            "fifo" => PresentMode::Fifo,
            "fifo_relaxed" => PresentMode::FifoRelaxed,
            other => {
                log::warn!("Unknown present mode '{}', defaulting to FIFO", other);
                PresentMode::Fifo
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RhiConfig::default();
        assert_eq!(config.present.buffer_count, 3);
        assert_eq!(config.present_mode(), PresentMode::Fifo);
    }

    #[test]
    fn parses_partial_config() {
        let config: RhiConfig = toml::from_str(
            r#"
            [present]
            mode = "mailbox"
            "#,
        )
        .unwrap();
        assert_eq!(config.present_mode(), PresentMode::Mailbox);
        // Unspecified sections keep their defaults.
        assert_eq!(config.present.buffer_count, 3);
        assert_eq!(config.app.name, "vk-rhi application");
    }

    #[test]
    fn unknown_present_mode_falls_back_to_fifo() {
        let _ = env_logger::builder().is_test(true).try_init();
        let config: RhiConfig = toml::from_str(
            r#"
            [present]
            mode = "turbo"
            "#,
        )
        .unwrap();
        assert_eq!(config.present_mode(), PresentMode::Fifo);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = RhiConfig::load_from_path("definitely/not/here.toml").unwrap();
        assert_eq!(config.present.buffer_count, 3);
    }
}
