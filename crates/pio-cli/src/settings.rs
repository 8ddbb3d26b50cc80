//! CLI settings

use std::path::{Path, PathBuf};

use pio_mux::{ChannelConfig, SerialConfig, WorkerConfig};
use serde::{Deserialize, Serialize};

/// Settings shared by every invocation of the CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Serial port used when `--port` is not given
    pub serial_port: Option<String>,
    /// Serial line settings
    pub serial: SerialConfig,
    /// Transport worker timing
    pub worker: WorkerConfig,
    /// Caller-side reply timeout
    pub channel: ChannelConfig,
}

impl Settings {
    /// Get the XDG config directory for proxy-io
    /// Uses $XDG_CONFIG_HOME/proxy-io on Linux/macOS, falls back to ~/.config/proxy-io
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("proxy-io"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("proxy-io"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        Self::settings_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Load settings from `path`, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<PathBuf, String> {
        let path =
            Self::settings_path().ok_or_else(|| "Could not determine settings path".to_string())?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save settings to `path`, creating its directory
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create settings directory: {}", e))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        std::fs::write(path, json).map_err(|e| format!("Failed to write settings: {}", e))?;

        Ok(())
    }
}
