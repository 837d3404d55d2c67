// SPDX-License-Identifier: GPL-3.0-only

//! Persistent greenscreen settings
//!
//! Settings are not global: a [`SettingsStore`] handle is passed to the
//! engine, which loads it once at construction and writes it back only when
//! asked to.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::{DEFAULT_DEPTH_HISTORY, DEFAULT_KEY_COLOR, DEFAULT_MAX_DISTANCE_METERS};
use crate::errors::ConfigError;

/// Directory name under the user configuration directory
const CONFIG_DIR_NAME: &str = "depth-greenscreen";
const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Serial number of the selected device (empty = default device)
    pub serial: String,
    /// Selected resolution label, e.g. "1280 × 720" (empty = default)
    pub resolution: String,
    /// Key color as 0xRRGGBB
    pub background_color: u32,
    /// Far clipping plane in meters
    pub max_distance: f64,
    /// Depth history length in frames
    pub depth_filter: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            serial: String::new(),
            resolution: String::new(),
            background_color: DEFAULT_KEY_COLOR,
            max_distance: f64::from(DEFAULT_MAX_DISTANCE_METERS),
            depth_filter: DEFAULT_DEPTH_HISTORY as u32,
        }
    }
}

impl Settings {
    /// Whether a specific device/resolution was stored
    pub fn has_device(&self) -> bool {
        !self.serial.is_empty() || !self.resolution.is_empty()
    }
}

/// Load/save capability for [`Settings`]
pub trait SettingsStore: Send + Sync {
    /// Read the stored settings; absent keys take their defaults
    fn load(&self) -> Result<Settings, ConfigError>;

    fn save(&self, settings: &Settings) -> Result<(), ConfigError>;
}

/// Settings kept as a JSON file
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/depth-greenscreen/settings.json`
    pub fn default_location() -> Result<Self, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(Self::new(dir.join(CONFIG_DIR_NAME).join(SETTINGS_FILE_NAME)))
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<Settings, ConfigError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No settings file, using defaults");
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(&self.path).map_err(|source| ConfigError::FileRead {
            path: self.path.clone(),
            source,
        })?;
        let settings = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), "Loaded settings");
        Ok(settings)
    }

    fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = serde_json::to_string_pretty(settings).map_err(ConfigError::Serialize)?;
        fs::write(&self.path, content).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })?;

        info!(path = %self.path.display(), "Saved settings");
        Ok(())
    }
}

/// Settings held in memory, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    settings: Arc<Mutex<Settings>>,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(Mutex::new(settings)),
        }
    }

    /// The most recently saved settings
    pub fn current(&self) -> Settings {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Settings> {
        self.settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Settings, ConfigError> {
        Ok(self.current())
    }

    fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        *self.lock() = settings.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.background_color, 0xdd44ff);
        assert_eq!(settings.max_distance, 1.0);
        assert_eq!(settings.depth_filter, 4);
        assert!(!settings.has_device());
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let settings: Settings = serde_json::from_str(r#"{ "serial": "8273" }"#).unwrap();
        assert_eq!(settings.serial, "8273");
        assert_eq!(settings.background_color, 0xdd44ff);
        assert_eq!(settings.depth_filter, 4);
        assert!(settings.has_device());
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemorySettingsStore::default();
        let mut settings = store.load().unwrap();
        settings.max_distance = 2.5;
        store.save(&settings).unwrap();

        let clone = store.clone();
        assert_eq!(clone.load().unwrap().max_distance, 2.5);
    }
}
