use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::models::FocusLossStrategy;

const MIN_POLL_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaybackSettings {
    pub focus_poll_interval_ms: u64,
    pub focus_debounce_ms: u64,
    pub probe_timeout_ms: u64,
    pub stop_grace_ms: u64,
    pub liveness_interval_ms: u64,
    pub default_focus_strategy: FocusLossStrategy,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            focus_poll_interval_ms: 300,
            focus_debounce_ms: 150,
            probe_timeout_ms: 2_000,
            stop_grace_ms: 2_000,
            liveness_interval_ms: 5_000,
            default_focus_strategy: FocusLossStrategy::AutoPause,
        }
    }
}

impl PlaybackSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.focus_poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.focus_debounce_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    /// Apply `FOCUSPLAY_POLL_MS` / `FOCUSPLAY_DEBOUNCE_MS` if set and numeric.
    pub fn from_env_overrides(mut self) -> Self {
        if let Some(value) = env_millis("FOCUSPLAY_POLL_MS") {
            self.focus_poll_interval_ms = value;
        }
        if let Some(value) = env_millis("FOCUSPLAY_DEBOUNCE_MS") {
            self.focus_debounce_ms = value;
        }
        self
    }
}

fn env_millis(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring {key}={raw:?}: not a millisecond count");
            None
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<PlaybackSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Settings at {} are unreadable ({err}); using defaults",
                    path.display()
                );
                PlaybackSettings::default()
            })
        } else {
            PlaybackSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn current(&self) -> PlaybackSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, settings: PlaybackSettings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: PlaybackSettings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings at {}", self.path.display()))?;
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = data;
        Ok(())
    }

    fn persist(&self, data: &PlaybackSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
