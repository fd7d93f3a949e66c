use crate::plot::RenderConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Rendering used when a run specification has no override.
    pub render: RenderConfig,
    /// Write rolling log files next to the console output.
    pub log_to_file: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            render: RenderConfig::default(),
            log_to_file: true,
        }
    }
}

pub fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("keyfi")
        .join("config.json")
}

/// Loads settings from the platform config directory, falling back to the
/// defaults when the file is missing or unreadable.
pub fn load_app_config() -> AppConfig {
    load_app_config_from(&get_config_path())
}

pub fn load_app_config_from(path: &Path) -> AppConfig {
    if path.exists()
        && let Ok(content) = std::fs::read_to_string(path)
    {
        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => return config,
            Err(e) => tracing::warn!("Ignoring invalid config {}: {e}", path.display()),
        }
    }
    AppConfig::default()
}

pub fn save_app_config(config: &AppConfig) -> Result<()> {
    save_app_config_to(config, &get_config_path())
}

pub fn save_app_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
