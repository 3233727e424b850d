//! Registry of applications that playback sessions may target.
//!
//! Records keep insertion order. Liveness fields are only ever written from a
//! probe result, never set directly by callers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{PlaybackError, Result};
use crate::models::{
    ApplicationStatus, FocusLossStrategy, IdentityHints, NewApplication, RegisteredApplication,
};
use crate::os_bridge::{ProcessMatch, ProcessProbe};
use crate::settings::PlaybackSettings;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Answers whether an application is still the target of a live session.
/// Consulted by [`ApplicationRegistry::remove`] while the registry is locked.
pub trait SessionGuard: Send + Sync {
    fn has_active_session(&self, app_id: &str) -> bool;
}

pub struct ApplicationRegistry {
    apps: RwLock<Vec<RegisteredApplication>>,
    probe: Arc<dyn ProcessProbe>,
    probe_timeout: Duration,
    default_strategy: FocusLossStrategy,
}

impl ApplicationRegistry {
    pub fn new(probe: Arc<dyn ProcessProbe>, settings: &PlaybackSettings) -> Self {
        Self {
            apps: RwLock::new(Vec::new()),
            probe,
            probe_timeout: settings.probe_timeout(),
            default_strategy: settings.default_focus_strategy,
        }
    }

    pub async fn register(&self, candidate: NewApplication) -> Result<RegisteredApplication> {
        let name = candidate.name.trim().to_string();
        let executable_path = candidate.executable_path.trim().to_string();
        let process_name = candidate.process_name.trim().to_string();

        if name.is_empty() {
            return Err(PlaybackError::InvalidApplication(
                "name must not be empty".into(),
            ));
        }
        if executable_path.is_empty() && process_name.is_empty() {
            return Err(PlaybackError::InvalidApplication(
                "either a process name or an executable path is required".into(),
            ));
        }

        let mut apps = self.apps.write().await;

        let duplicate = apps.iter().any(|app| {
            app.executable_path == executable_path
                && app.process_name.eq_ignore_ascii_case(&process_name)
        });
        if duplicate {
            return Err(PlaybackError::DuplicateIdentity {
                executable_path,
                process_name,
            });
        }

        let app = RegisteredApplication {
            id: Uuid::new_v4().to_string(),
            name,
            executable_path,
            process_name,
            bundle_id: candidate
                .bundle_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
            process_id: None,
            status: ApplicationStatus::Inactive,
            registered_at: Utc::now(),
            last_seen: None,
            default_focus_strategy: candidate
                .default_focus_strategy
                .unwrap_or(self.default_strategy),
        };

        log_info!(
            "Registered application {} ({}) with default strategy {}",
            app.name,
            app.id,
            app.default_focus_strategy
        );

        apps.push(app.clone());
        Ok(app)
    }

    /// Remove a registration. Fails with `SessionActive` while `sessions`
    /// reports a non-terminal session for `id`; nothing changes in that case.
    pub async fn remove(
        &self,
        id: &str,
        sessions: &dyn SessionGuard,
    ) -> Result<RegisteredApplication> {
        let mut apps = self.apps.write().await;

        let index = apps
            .iter()
            .position(|app| app.id == id)
            .ok_or_else(|| PlaybackError::ApplicationNotFound(id.to_string()))?;

        if sessions.has_active_session(id) {
            log_warn!("Refusing to remove application {id}: playback session still active");
            return Err(PlaybackError::SessionActive(id.to_string()));
        }

        let removed = apps.remove(index);
        log_info!("Removed application {} ({})", removed.name, removed.id);
        Ok(removed)
    }

    /// Probe the OS for a live process matching this registration and record
    /// the result. A missing process is `Inactive`, not an error.
    pub async fn refresh_status(&self, id: &str) -> Result<RegisteredApplication> {
        let hints = {
            let apps = self.apps.read().await;
            apps.iter()
                .find(|app| app.id == id)
                .map(RegisteredApplication::identity_hints)
                .ok_or_else(|| PlaybackError::ApplicationNotFound(id.to_string()))?
        };

        let found = self.run_probe(id, hints).await?;

        let mut apps = self.apps.write().await;
        let app = apps
            .iter_mut()
            .find(|app| app.id == id)
            .ok_or_else(|| PlaybackError::ApplicationNotFound(id.to_string()))?;

        match found {
            Some(ProcessMatch {
                process_id,
                alive: true,
            }) => {
                if app.status != ApplicationStatus::Active || app.process_id != Some(process_id) {
                    log_info!("Application {} is live as pid {}", app.name, process_id);
                }
                app.status = ApplicationStatus::Active;
                app.process_id = Some(process_id);
                app.last_seen = Some(Utc::now());
            }
            _ => {
                if app.status == ApplicationStatus::Active {
                    log_info!("Application {} is no longer running", app.name);
                }
                app.status = ApplicationStatus::Inactive;
            }
        }

        Ok(app.clone())
    }

    /// Refresh every registration, returning the records whose probe succeeded.
    pub async fn refresh_all(&self) -> Vec<RegisteredApplication> {
        let ids: Vec<String> = self.apps.read().await.iter().map(|app| app.id.clone()).collect();

        let mut refreshed = Vec::with_capacity(ids.len());
        for id in ids {
            match self.refresh_status(&id).await {
                Ok(app) => refreshed.push(app),
                // Removed between listing and probing
                Err(PlaybackError::ApplicationNotFound(_)) => {}
                Err(err) => log_warn!("Liveness refresh failed for {id}: {err}"),
            }
        }
        refreshed
    }

    pub async fn list(&self) -> Vec<RegisteredApplication> {
        self.apps.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Result<RegisteredApplication> {
        self.apps
            .read()
            .await
            .iter()
            .find(|app| app.id == id)
            .cloned()
            .ok_or_else(|| PlaybackError::ApplicationNotFound(id.to_string()))
    }

    /// Read access held across session creation so a concurrent removal
    /// cannot slip between the lookup and the insert.
    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, Vec<RegisteredApplication>> {
        self.apps.read().await
    }

    /// Periodically refresh every registration until `cancel` fires.
    pub fn spawn_liveness_watch(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let refreshed = registry.refresh_all().await;
                        log_debug!("Liveness watch refreshed {} applications", refreshed.len());
                    }
                    _ = cancel.cancelled() => {
                        log_info!("Liveness watch shutting down");
                        break;
                    }
                }
            }
        })
    }

    async fn run_probe(&self, id: &str, hints: IdentityHints) -> Result<Option<ProcessMatch>> {
        let probe = Arc::clone(&self.probe);
        let task = tokio::task::spawn_blocking(move || probe.query_process(&hints));

        match tokio::time::timeout(self.probe_timeout, task).await {
            Ok(Ok(Ok(found))) => Ok(found),
            Ok(Ok(Err(err))) => {
                log_warn!("Process probe for {id} failed: {err:#}");
                Err(PlaybackError::ProbeFailed(format!("{err:#}")))
            }
            Ok(Err(join_err)) => Err(PlaybackError::ProbeFailed(format!(
                "probe worker failed to join: {join_err}"
            ))),
            Err(_) => {
                log_warn!(
                    "Process probe for {id} timed out after {}ms",
                    self.probe_timeout.as_millis()
                );
                Err(PlaybackError::ProbeFailed(format!(
                    "timed out after {}ms",
                    self.probe_timeout.as_millis()
                )))
            }
        }
    }
}
