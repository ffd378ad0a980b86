//! Persisted user preferences
//!
//! A [`PreferenceStore`] is a flat string key/value store. [`Preferences`]
//! wraps one with typed accessors and fallback parsing, so views never touch
//! raw keys. Storage failures are logged and otherwise ignored: a missing or
//! unwritable store behaves like an empty one.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::api::LocationCategory;
use crate::{Error, Result};

pub const KEY_NAME: &str = "aac_name";
pub const KEY_LOCATION: &str = "aac_location";
pub const KEY_VOICE_MODE: &str = "aac_voice_mode";
pub const KEY_SHOW_SPOKEN_TEXT: &str = "aac_show_spoken_text";

/// Raw string key/value persistence
pub trait PreferenceStore: Send + Sync {
    /// Read a value
    ///
    /// # Errors
    ///
    /// Returns error if the backing storage cannot be read
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value
    ///
    /// # Errors
    ///
    /// Returns error if the backing storage cannot be written
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value
    ///
    /// # Errors
    ///
    /// Returns error if the backing storage cannot be written
    fn remove(&self, key: &str) -> Result<()>;
}

/// Volatile store, used in tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| Error::Storage("preference lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .map_err(|_| Error::Storage("preference lock poisoned".to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values
            .lock()
            .map_err(|_| Error::Storage("preference lock poisoned".to_string()))?
            .remove(key);
        Ok(())
    }
}

/// JSON file store, one object of string values
///
/// The file is read once on open and rewritten atomically on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`
    ///
    /// A missing file starts empty. An unreadable or corrupt file is logged
    /// and also starts empty; it is replaced on the next write.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse preferences, starting empty"
                );
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to read preferences"
                );
                BTreeMap::new()
            }
        };

        tracing::debug!(path = %path.display(), keys = values.len(), "preferences loaded");

        Self {
            path,
            values: Mutex::new(values),
        }
    }

    /// Location of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut staged = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut staged, values)?;
        staged
            .persist(&self.path)
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| Error::Storage("preference lock poisoned".to_string()))?;
        apply(&mut values);
        self.persist(&values)
    }
}

impl PreferenceStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| Error::Storage("preference lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|values| {
            values.remove(key);
        })
    }
}

/// Location context for the conversation screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Location {
    #[default]
    Home,
    School,
    Out,
}

impl Location {
    pub const ALL: [Self; 3] = [Self::Home, Self::School, Self::Out];

    /// Storage and wire form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Home => "HOME",
            Self::School => "SCHOOL",
            Self::Out => "OUT",
        }
    }

    /// Human-readable label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Home => "Home",
            Self::School => "School",
            Self::Out => "Out",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Location {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Validation(format!("unknown location: {s}")))
    }
}

/// Typed view over a [`PreferenceStore`]
#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn PreferenceStore>,
}

impl fmt::Debug for Preferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preferences").finish_non_exhaustive()
    }
}

impl Preferences {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    /// Preferences backed by a fresh [`MemoryStore`]
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    fn read(&self, key: &str) -> Option<String> {
        self.store.get(key).unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "failed to read preference");
            None
        })
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            tracing::warn!(key, error = %e, "failed to write preference");
        }
    }

    fn delete(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            tracing::warn!(key, error = %e, "failed to remove preference");
        }
    }

    fn read_flag(&self, key: &str, default: bool) -> bool {
        match self.read(key).as_deref() {
            Some("true") => true,
            Some("false") => false,
            _ => default,
        }
    }

    /// Stored user name, if set and non-blank
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.read(KEY_NAME)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
    }

    pub fn set_name(&self, name: &str) {
        self.write(KEY_NAME, name);
    }

    pub fn clear_name(&self) {
        self.delete(KEY_NAME);
    }

    /// Conversation location, `Home` when unset or unrecognised
    #[must_use]
    pub fn location(&self) -> Location {
        self.read(KEY_LOCATION)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    pub fn set_location(&self, location: Location) {
        self.write(KEY_LOCATION, location.as_str());
    }

    /// Compose location category, `Home` when unset or unrecognised
    #[must_use]
    pub fn location_category(&self) -> LocationCategory {
        self.read(KEY_LOCATION)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    pub fn set_location_category(&self, category: LocationCategory) {
        self.write(KEY_LOCATION, category.as_str());
    }

    /// Whether the "hey <name>" wake phrase gates heard speech (default off)
    #[must_use]
    pub fn voice_mode(&self) -> bool {
        self.read_flag(KEY_VOICE_MODE, false)
    }

    pub fn set_voice_mode(&self, enabled: bool) {
        self.write(KEY_VOICE_MODE, if enabled { "true" } else { "false" });
    }

    /// Whether reply text is shown under tile labels (default on)
    #[must_use]
    pub fn show_spoken_text(&self) -> bool {
        self.read_flag(KEY_SHOW_SPOKEN_TEXT, true)
    }

    pub fn set_show_spoken_text(&self, show: bool) {
        self.write(KEY_SHOW_SPOKEN_TEXT, if show { "true" } else { "false" });
    }
}
