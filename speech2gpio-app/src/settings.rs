//! Session settings loaded from a JSON file in the app data directory.
//!
//! The file is only read; a missing or malformed file falls back to
//! `SessionConfig::default()`.

use std::fs;
use std::path::{Path, PathBuf};

use speech2gpio_core::SessionConfig;
use tracing::warn;

/// Overrides `default_settings_path()` when set.
pub const CONFIG_ENV: &str = "SPEECH2GPIO_CONFIG";

pub fn settings_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(default_settings_path)
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("speech2gpio")
            .join("config.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".config")
            })
            .join("speech2gpio")
            .join("config.json")
    }
}

pub fn load_settings(path: &Path) -> SessionConfig {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return SessionConfig::default(),
    };
    match SessionConfig::from_json(&raw) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = ?path, "ignoring settings file: {e}");
            SessionConfig::default()
        }
    }
}
