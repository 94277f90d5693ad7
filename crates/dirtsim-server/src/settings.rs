//! Persisted user settings, loaded at startup and saved on change.

use std::path::{Path, PathBuf};

use dirtproto::scenario::ScenarioId;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const SETTINGS_FILE: &str = "user-settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub master_volume_percent: i32,
    pub last_scenario: Option<ScenarioId>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            master_volume_percent: 80,
            last_scenario: None,
        }
    }
}

impl UserSettings {
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(SETTINGS_FILE)
    }

    /// Load from the data dir; corrupt or missing files fall back to
    /// defaults rather than failing startup.
    pub fn load(dir: &Path) -> Self {
        let path = Self::path_in(dir);
        match std::fs::read_to_string(&path) {
            Ok(body) => serde_json::from_str(&body).unwrap_or_else(|e| {
                warn!(target: "network", "Corrupt {SETTINGS_FILE}: {e}; using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, dir: &Path) -> std::io::Result<()> {
        let body = serde_json::to_string_pretty(self).expect("settings serialize");
        std::fs::write(Self::path_in(dir), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let settings = UserSettings {
            master_volume_percent: 55,
            last_scenario: Some(ScenarioId::Raining),
        };
        settings.save(dir.path()).unwrap();
        assert_eq!(UserSettings::load(dir.path()), settings);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(UserSettings::load(dir.path()), UserSettings::default());
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{not json").unwrap();
        assert_eq!(UserSettings::load(dir.path()), UserSettings::default());
    }
}
