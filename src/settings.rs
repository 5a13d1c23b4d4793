use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::camera::Facing;
use crate::session::ScanConfig;

/// User-facing scan preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanSettings {
    pub preferred_facing: Facing,
    pub cooldown_ms: u64,
    pub failure_hint_threshold: u32,
    /// Subscribe a history recorder to every new session.
    pub record_history: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        let config = ScanConfig::default();
        Self {
            preferred_facing: config.preferred_facing,
            cooldown_ms: config.cooldown_ms,
            failure_hint_threshold: config.failure_hint_threshold,
            record_history: true,
        }
    }
}

impl ScanSettings {
    /// Overlay these preferences on `base`.
    pub fn apply_to(&self, base: ScanConfig) -> ScanConfig {
        ScanConfig {
            preferred_facing: self.preferred_facing,
            cooldown_ms: self.cooldown_ms,
            failure_hint_threshold: self.failure_hint_threshold,
            ..base
        }
    }

    pub fn to_config(&self) -> ScanConfig {
        self.apply_to(ScanConfig::default())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    scan: ScanSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn scan(&self) -> ScanSettings {
        self.read().scan.clone()
    }

    /// Validates the resulting config before anything is written.
    pub fn update_scan(&self, settings: ScanSettings) -> Result<()> {
        settings
            .to_config()
            .validate()
            .context("Rejected scan settings")?;
        let mut guard = self.write();
        guard.scan = settings;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: UserSettings = serde_json::from_str(&contents)?;
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("masbarato-settings-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn missing_file_gives_defaults() {
        let store = SettingsStore::new(temp_path()).unwrap();
        assert_eq!(store.scan(), ScanSettings::default());
        assert_eq!(store.scan().to_config(), ScanConfig::default());
    }

    #[test]
    fn updates_persist_and_reload() {
        let path = temp_path();
        let store = SettingsStore::new(path.clone()).unwrap();
        let settings = ScanSettings {
            preferred_facing: Facing::User,
            cooldown_ms: 5_000,
            failure_hint_threshold: 6,
            record_history: false,
        };
        store.update_scan(settings.clone()).unwrap();

        let reopened = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(reopened.scan(), settings);
        assert_eq!(reopened.scan().to_config().cooldown_ms, 5_000);

        fs::write(&path, r#"{"scan":{"cooldownMs":3000}}"#).unwrap();
        reopened.reload().unwrap();
        assert_eq!(reopened.scan().cooldown_ms, 3_000);
        assert!(reopened.scan().record_history);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn invalid_settings_are_not_written() {
        let path = temp_path();
        let store = SettingsStore::new(path.clone()).unwrap();
        let bad = ScanSettings {
            failure_hint_threshold: 0,
            ..ScanSettings::default()
        };
        assert!(store.update_scan(bad).is_err());
        assert!(!path.exists());
    }
}
