use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::store::Credentials;

pub const SETTINGS_PATH_VAR: &str = "SAREE_TRACKER_SETTINGS";
pub const DATABASE_PATH_VAR: &str = "SAREE_TRACKER_DB";
pub const EMAIL_VAR: &str = "SAREE_TRACKER_EMAIL";
pub const PASSWORD_VAR: &str = "SAREE_TRACKER_PASSWORD";
pub const DEMO_VAR: &str = "SAREE_TRACKER_DEMO";

const DEFAULT_SETTINGS_FILE: &str = "saree-tracker.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreSettings {
    /// SQLite file backing the store. `None` keeps everything in memory.
    pub database_path: Option<PathBuf>,
    pub email: String,
    pub password: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database_path: None,
            email: "operator@saree-tracker.local".into(),
            password: "handloom-demo".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RealtimeSettings {
    pub enabled: bool,
    pub auto_refresh: bool,
    pub refresh_interval_secs: u64,
    pub session_refresh_secs: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_refresh: true,
            refresh_interval_secs: 60,
            session_refresh_secs: 30 * 60,
        }
    }
}

impl RealtimeSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn session_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.session_refresh_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DemoSettings {
    pub enabled: bool,
    pub seed_units: usize,
    pub simulation_interval_secs: u64,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            seed_units: 24,
            simulation_interval_secs: 5,
        }
    }
}

impl DemoSettings {
    pub fn simulation_interval(&self) -> Duration {
        Duration::from_secs(self.simulation_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
struct UserSettings {
    store: StoreSettings,
    realtime: RealtimeSettings,
    demo: DemoSettings,
}

/// Values taken from the environment. They win over the file and are
/// never written back to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct EnvOverrides {
    database_path: Option<PathBuf>,
    email: Option<String>,
    password: Option<String>,
    demo: Option<bool>,
}

impl EnvOverrides {
    fn collect(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let demo = lookup(DEMO_VAR).and_then(|raw| match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            other => {
                log::warn!("Ignoring {DEMO_VAR}={other}: expected true or false");
                None
            }
        });

        Self {
            database_path: lookup(DATABASE_PATH_VAR).map(PathBuf::from),
            email: lookup(EMAIL_VAR),
            password: lookup(PASSWORD_VAR),
            demo,
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
    overrides: EnvOverrides,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Settings file {} is invalid ({err}); using defaults",
                    path.display()
                );
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
            overrides: EnvOverrides::default(),
        })
    }

    /// Load settings from `SAREE_TRACKER_SETTINGS` (or the default file in
    /// the working directory) and apply the environment overrides.
    pub fn from_env() -> Result<Self> {
        let path = env::var_os(SETTINGS_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
        let mut store = Self::new(path)?;
        store.overrides = EnvOverrides::collect(|key| env::var(key).ok());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn store(&self) -> StoreSettings {
        let mut store = self.read().store.clone();
        if let Some(path) = &self.overrides.database_path {
            store.database_path = Some(path.clone());
        }
        if let Some(email) = &self.overrides.email {
            store.email = email.clone();
        }
        if let Some(password) = &self.overrides.password {
            store.password = password.clone();
        }
        store
    }

    pub fn credentials(&self) -> Credentials {
        let store = self.store();
        Credentials {
            email: store.email,
            password: store.password,
        }
    }

    pub fn realtime(&self) -> RealtimeSettings {
        self.read().realtime.clone()
    }

    pub fn demo(&self) -> DemoSettings {
        let mut demo = self.read().demo.clone();
        if let Some(enabled) = self.overrides.demo {
            demo.enabled = enabled;
        }
        demo
    }

    pub fn update_realtime(&self, settings: RealtimeSettings) -> Result<()> {
        let mut guard = self.write();
        guard.realtime = settings;
        self.persist(&guard)
    }

    pub fn update_demo(&self, settings: DemoSettings) -> Result<()> {
        let mut guard = self.write();
        guard.demo = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
