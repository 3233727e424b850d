//! Registered application records.
//!
//! `status`, `process_id` and `last_seen` are written only by the registry's
//! liveness probe; everything else is fixed at registration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::FocusLossStrategy;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ApplicationStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredApplication {
    pub id: String,
    pub name: String,
    pub executable_path: String,
    pub process_name: String,
    pub bundle_id: Option<String>,
    pub process_id: Option<u32>,
    pub status: ApplicationStatus,
    pub registered_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
    pub default_focus_strategy: FocusLossStrategy,
}

impl RegisteredApplication {
    pub fn identity_hints(&self) -> IdentityHints {
        IdentityHints {
            executable_path: non_empty(&self.executable_path),
            process_name: non_empty(&self.process_name),
            bundle_id: self.bundle_id.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ApplicationStatus::Active
    }
}

/// Registration request coming from the presentation layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApplication {
    pub name: String,
    #[serde(default)]
    pub executable_path: String,
    #[serde(default)]
    pub process_name: String,
    #[serde(default)]
    pub bundle_id: Option<String>,
    /// Falls back to the configured default strategy when absent.
    #[serde(default)]
    pub default_focus_strategy: Option<FocusLossStrategy>,
}

impl NewApplication {
    pub fn new(name: impl Into<String>, process_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            process_name: process_name.into(),
            ..Self::default()
        }
    }

    pub fn with_executable_path(mut self, path: impl Into<String>) -> Self {
        self.executable_path = path.into();
        self
    }

    pub fn with_bundle_id(mut self, bundle_id: impl Into<String>) -> Self {
        self.bundle_id = Some(bundle_id.into());
        self
    }

    pub fn with_strategy(mut self, strategy: FocusLossStrategy) -> Self {
        self.default_focus_strategy = Some(strategy);
        self
    }
}

/// What the OS probe gets to match a live process against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityHints {
    pub executable_path: Option<String>,
    pub process_name: Option<String>,
    pub bundle_id: Option<String>,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
