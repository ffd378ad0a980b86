//! TOML configuration file loading
//!
//! Supports `~/.config/aac/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Backend API configuration
    #[serde(default)]
    pub api: ApiFileConfig,

    /// Speech input/output configuration
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Screen timing
    #[serde(default)]
    pub ui: UiFileConfig,

    /// Local storage
    #[serde(default)]
    pub storage: StorageFileConfig,
}

/// Backend API configuration
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiFileConfig {
    /// Base URL of the AAC backend (e.g. "http://localhost:8080")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Speech configuration
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechFileConfig {
    /// Recognition language (e.g. "en-GB")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// TTS voice passed to the backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts_voice: Option<String>,

    /// External audio player program (e.g. "mpv")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
}

/// Screen timing configuration
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiFileConfig {
    /// Quiet period before dialogue/suggestion requests, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,

    /// Wake window after a bare "hey <name>", in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wake_window_secs: Option<u64>,
}

/// Local storage configuration
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageFileConfig {
    /// Preference file location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefs_path: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    config_file_path().map_or_else(ConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_config_file_from(path: &Path) -> ConfigFile {
    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Write `config` to `path`, creating parent directories
///
/// # Errors
///
/// Returns error if serialization or the write fails
pub fn save_config_file(config: &ConfigFile, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| crate::Error::Config(format!("failed to serialize config: {e}")))?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "saved config file");
    Ok(())
}

/// Return the config file path: `~/.config/aac/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("aac").join("config.toml"))
}
