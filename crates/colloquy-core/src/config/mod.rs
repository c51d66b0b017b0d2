use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::domain::title::{DEFAULT_COMMAND_TITLE_MAX_CHARS, TitleOptions};
use crate::app::domain::types::DeviceId;
use crate::error::{Error, Result};

pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;
pub const DEFAULT_FOLLOW_UP_PREFIX: &str = "/queue ";
pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Engine settings, read from `<config_dir>/colloquy/engine.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Stamped on every event this client appends.
    pub device_id: Option<DeviceId>,
    pub frame_interval_ms: u64,
    pub follow_up_prefix: String,
    pub page_size: usize,
    pub command_title_max_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            follow_up_prefix: DEFAULT_FOLLOW_UP_PREFIX.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            command_title_max_chars: DEFAULT_COMMAND_TITLE_MAX_CHARS,
        }
    }
}

impl EngineConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn title_options(&self) -> TitleOptions {
        TitleOptions {
            command_max_chars: self.command_title_max_chars,
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            Error::Configuration("Could not determine config directory".to_string())
        })?;
        Ok(config_dir.join("colloquy").join("engine.toml"))
    }

    /// Load the config from its default location, or defaults if not found.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    "Failed to parse engine config at {:?}: {}. Using defaults.",
                    path,
                    e
                );
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| {
            Error::Configuration(format!("Failed to serialize engine config: {e}"))
        })?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Fills in a device id if none is configured yet.
    pub fn ensure_device_id(&mut self) -> &DeviceId {
        self.device_id.get_or_insert_with(DeviceId::generate)
    }
}
