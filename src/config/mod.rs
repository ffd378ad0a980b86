//! Runtime configuration
//!
//! Values are layered env > `config.toml` > defaults.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

pub use file::{ConfigFile, config_file_path, load_config_file, save_config_file};

use crate::speech::DEFAULT_LANGUAGE;
use crate::views::ConversationSettings;

/// Backend used when nothing is configured
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Default quiet period before a dialogue or suggestions request
pub const DEFAULT_DEBOUNCE_MS: u64 = 250;

/// Default wake window after a bare "hey <name>"
pub const DEFAULT_WAKE_WINDOW_SECS: u64 = 7;

/// Resolved AAC companion configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Backend base URL
    pub api_url: String,
    /// Speech recognition language
    pub language: String,
    /// TTS voice requested from the backend
    pub tts_voice: Option<String>,
    /// External player program; `None` uses the audio device or autodetects
    pub player: Option<String>,
    pub debounce: Duration,
    pub wake_window: Duration,
    /// Preference file
    pub prefs_path: PathBuf,
}

impl Config {
    /// Load configuration from the environment and the config file
    #[must_use]
    pub fn load() -> Self {
        Self::from_sources(load_config_file(), |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    pub fn from_sources(fc: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let api_url = non_empty("AAC_API_URL")
            .or(fc.api.base_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let language = non_empty("AAC_SPEECH_LANGUAGE")
            .or(fc.speech.language)
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        let tts_voice = non_empty("AAC_TTS_VOICE").or(fc.speech.tts_voice);
        let player = non_empty("AAC_PLAYER").or(fc.speech.player);

        let prefs_path = non_empty("AAC_PREFS_PATH")
            .or(fc.storage.prefs_path)
            .map_or_else(default_prefs_path, PathBuf::from);

        Self {
            api_url,
            language,
            tts_voice,
            player,
            debounce: Duration::from_millis(fc.ui.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)),
            wake_window: Duration::from_secs(
                fc.ui.wake_window_secs.unwrap_or(DEFAULT_WAKE_WINDOW_SECS),
            ),
            prefs_path,
        }
    }

    /// Timing for the conversation screen
    #[must_use]
    pub const fn conversation_settings(&self) -> ConversationSettings {
        ConversationSettings {
            debounce: self.debounce,
            wake_window: self.wake_window,
        }
    }

    /// The config as a file, for `aac setup` to edit
    #[must_use]
    pub fn to_file(&self) -> ConfigFile {
        let mut fc = ConfigFile::default();
        fc.api.base_url = Some(self.api_url.clone());
        fc.speech.language = Some(self.language.clone());
        fc.speech.tts_voice.clone_from(&self.tts_voice);
        fc.speech.player.clone_from(&self.player);
        fc.ui.debounce_ms = u64::try_from(self.debounce.as_millis()).ok();
        fc.ui.wake_window_secs = Some(self.wake_window.as_secs());
        fc.storage.prefs_path = Some(self.prefs_path.display().to_string());
        fc
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_sources(ConfigFile::default(), |_| None)
    }
}

/// `<data_dir>/aac/preferences.json`
fn default_prefs_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("preferences.json"),
        |d| d.data_dir().join("aac").join("preferences.json"),
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_url, "http://localhost:8080");
        assert_eq!(config.language, "en-GB");
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert_eq!(config.wake_window, Duration::from_secs(7));
        assert!(config.tts_voice.is_none());
        assert!(config.prefs_path.ends_with("preferences.json"));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut fc = ConfigFile::default();
        fc.api.base_url = Some("http://file:1".to_string());
        fc.ui.wake_window_secs = Some(3);
        fc.storage.prefs_path = Some("/tmp/prefs.json".to_string());

        let config = Config::from_sources(fc, |_| None);
        assert_eq!(config.api_url, "http://file:1");
        assert_eq!(config.wake_window, Duration::from_secs(3));
        assert_eq!(config.prefs_path, PathBuf::from("/tmp/prefs.json"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut fc = ConfigFile::default();
        fc.api.base_url = Some("http://file:1".to_string());
        fc.speech.player = Some("mpv".to_string());

        let config = Config::from_sources(
            fc,
            env(&[
                ("AAC_API_URL", "http://env:2"),
                ("AAC_SPEECH_LANGUAGE", "de-DE"),
                ("AAC_PLAYER", "  "),
            ]),
        );
        assert_eq!(config.api_url, "http://env:2");
        assert_eq!(config.language, "de-DE");
        // blank env values don't mask the file
        assert_eq!(config.player.as_deref(), Some("mpv"));
    }

    #[test]
    fn test_to_file_round_trips_through_from_sources() {
        let config = Config::from_sources(
            ConfigFile::default(),
            env(&[("AAC_TTS_VOICE", "en-GB-SoniaNeural")]),
        );
        assert_eq!(Config::from_sources(config.to_file(), |_| None), config);
    }
}
