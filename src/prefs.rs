//! Client-local preferences.
//!
//! The kiosk consults a handful of boolean preferences (per-sensor and
//! per-background-video mute flags, the debug panel switch) but never requires
//! them: a missing key reads as its default. Keys keep the names the admin panel
//! writes (`sensor_17_muted`, `background_4_muted`, `debugEnabled`).

use crate::error::KioskResult;
use crate::sensors::SensorId;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A typed preference key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceKey {
    /// Mute flag of a sensor video.
    SensorMuted(SensorId),
    /// Mute flag of a background playlist entry, by entry id.
    BackgroundMuted(i64),
    /// Show the on-screen debug panel.
    DebugEnabled,
}

impl PreferenceKey {
    /// Value used when the key has never been set. Every key defaults to off.
    pub fn default_value(self) -> bool {
        false
    }
}

impl fmt::Display for PreferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreferenceKey::SensorMuted(sensor) => write!(f, "sensor_{sensor}_muted"),
            PreferenceKey::BackgroundMuted(id) => write!(f, "background_{id}_muted"),
            PreferenceKey::DebugEnabled => f.write_str("debugEnabled"),
        }
    }
}

/// Capability: persisted boolean preferences.
pub trait PreferenceStore: Send + Sync {
    /// Stored value, if any.
    fn lookup(&self, key: PreferenceKey) -> Option<bool>;

    /// Store `value` under `key`.
    fn set(&self, key: PreferenceKey, value: bool) -> KioskResult<()>;

    /// Stored value or the key's default.
    fn get(&self, key: PreferenceKey) -> bool {
        self.lookup(key).unwrap_or_else(|| key.default_value())
    }
}

/// Volatile store, used when no preference file is configured.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: RwLock<BTreeMap<String, bool>>,
}

impl MemoryPreferences {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn lookup(&self, key: PreferenceKey) -> Option<bool> {
        self.values.read().get(&key.to_string()).copied()
    }

    fn set(&self, key: PreferenceKey, value: bool) -> KioskResult<()> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }
}

/// Preferences persisted as a flat JSON object of booleans.
///
/// The file is read once on open and rewritten on every `set`.
#[derive(Debug)]
pub struct JsonFilePreferences {
    path: PathBuf,
    values: RwLock<BTreeMap<String, bool>>,
}

impl JsonFilePreferences {
    /// Open `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> KioskResult<Self> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            BTreeMap::new()
        };
        tracing::debug!(path = %path.display(), entries = values.len(), "preferences loaded");
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn lookup(&self, key: PreferenceKey) -> Option<bool> {
        self.values.read().get(&key.to_string()).copied()
    }

    fn set(&self, key: PreferenceKey, value: bool) -> KioskResult<()> {
        let mut values = self.values.write();
        values.insert(key.to_string(), value);
        let raw = serde_json::to_string_pretty(&*values)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn keys_use_admin_panel_names() {
        assert_eq!(
            PreferenceKey::SensorMuted(SensorId(17)).to_string(),
            "sensor_17_muted"
        );
        assert_eq!(
            PreferenceKey::BackgroundMuted(4).to_string(),
            "background_4_muted"
        );
        assert_eq!(PreferenceKey::DebugEnabled.to_string(), "debugEnabled");
    }

    #[test]
    fn missing_keys_read_as_defaults() {
        let prefs = MemoryPreferences::new();
        assert!(!prefs.get(PreferenceKey::SensorMuted(SensorId(7))));
        assert!(!prefs.get(PreferenceKey::DebugEnabled));
        prefs
            .set(PreferenceKey::SensorMuted(SensorId(7)), true)
            .unwrap();
        assert!(prefs.get(PreferenceKey::SensorMuted(SensorId(7))));
    }

    #[test]
    fn json_file_round_trips_between_opens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs").join("kiosk.json");

        let prefs = JsonFilePreferences::open(&path).unwrap();
        prefs.set(PreferenceKey::BackgroundMuted(2), false).unwrap();
        prefs.set(PreferenceKey::DebugEnabled, true).unwrap();
        drop(prefs);

        let reopened = JsonFilePreferences::open(&path).unwrap();
        assert_eq!(reopened.lookup(PreferenceKey::BackgroundMuted(2)), Some(false));
        assert!(reopened.get(PreferenceKey::DebugEnabled));
        assert_eq!(reopened.lookup(PreferenceKey::BackgroundMuted(3)), None);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kiosk.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(JsonFilePreferences::open(&path).is_err());
    }
}
