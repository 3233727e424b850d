pub mod error;
pub mod focus;
pub mod models;
pub mod os_bridge;
pub mod playback;
pub mod registry;
pub mod settings;
pub mod utils;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

pub use error::{PlaybackError, Result};
pub use focus::{FocusMonitor, FocusMonitorConfig};
pub use models::{
    ApplicationStatus, FocusLossStrategy, NewApplication, PauseOrigin, PlaybackSession,
    RegisteredApplication, SessionState, StopCause,
};
pub use os_bridge::{ForegroundProbe, ProcessMatch, ProcessProbe, SysinfoProcessProbe};
pub use playback::{PlaybackSessionManager, StepExecutor, StepResult};
pub use registry::ApplicationRegistry;
pub use settings::{PlaybackSettings, SettingsStore};
pub use utils::init_logging;

/// Entry point for the presentation layer. Every command returns the updated
/// entity snapshot or a typed failure; internal queues and subscriptions stay
/// hidden.
pub struct PlaybackController {
    registry: Arc<ApplicationRegistry>,
    sessions: Arc<PlaybackSessionManager>,
    monitor: Arc<FocusMonitor>,
    settings: PlaybackSettings,
    liveness: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl PlaybackController {
    pub fn new(
        settings: PlaybackSettings,
        processes: Arc<dyn ProcessProbe>,
        foreground: Arc<dyn ForegroundProbe>,
        executor: Arc<dyn StepExecutor>,
    ) -> Self {
        let registry = Arc::new(ApplicationRegistry::new(Arc::clone(&processes), &settings));
        let monitor = Arc::new(FocusMonitor::new(
            foreground,
            processes,
            FocusMonitorConfig::from(&settings),
        ));
        let sessions = Arc::new(PlaybackSessionManager::new(
            Arc::clone(&registry),
            Arc::clone(&monitor),
            executor,
            settings.stop_grace(),
        ));

        log::info!(
            "Playback controller ready (poll {}ms, debounce {}ms, default strategy {})",
            settings.poll_interval().as_millis(),
            settings.focus_debounce_ms,
            settings.default_focus_strategy
        );

        Self {
            registry,
            sessions,
            monitor,
            settings,
            liveness: Mutex::new(None),
        }
    }

    /// Build from a settings file (missing file means defaults) with env
    /// overrides applied, probing processes through `sysinfo`.
    pub fn from_settings_file(
        path: PathBuf,
        foreground: Arc<dyn ForegroundProbe>,
        executor: Arc<dyn StepExecutor>,
    ) -> anyhow::Result<Self> {
        utils::init_logging(utils::debug_mode_from_env());

        let store = SettingsStore::new(path)?;
        let settings = store.current().from_env_overrides();

        Ok(Self::new(
            settings,
            Arc::new(SysinfoProcessProbe::new()),
            foreground,
            executor,
        ))
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }

    pub async fn list_applications(&self) -> Vec<RegisteredApplication> {
        self.registry.list().await
    }

    pub async fn get_application(&self, app_id: &str) -> Result<RegisteredApplication> {
        self.registry.get(app_id).await
    }

    pub async fn register_application(
        &self,
        candidate: NewApplication,
    ) -> Result<RegisteredApplication> {
        self.registry.register(candidate).await
    }

    /// Fails with `SessionActive` until the application's session is stopped.
    pub async fn remove_application(&self, app_id: &str) -> Result<RegisteredApplication> {
        self.registry.remove(app_id, self.sessions.as_ref()).await
    }

    pub async fn refresh_application_status(
        &self,
        app_id: &str,
    ) -> Result<RegisteredApplication> {
        self.registry.refresh_status(app_id).await
    }

    pub async fn start_playback(
        &self,
        app_id: &str,
        strategy: Option<FocusLossStrategy>,
        script_path: Option<String>,
    ) -> Result<PlaybackSession> {
        self.sessions.start(app_id, strategy, script_path).await
    }

    pub async fn pause_playback(&self, app_id: &str) -> Result<PlaybackSession> {
        self.sessions.pause(app_id).await
    }

    pub async fn resume_playback(&self, app_id: &str) -> Result<PlaybackSession> {
        self.sessions.resume(app_id).await
    }

    pub async fn stop_playback(&self, app_id: &str) -> Result<PlaybackSession> {
        self.sessions.stop(app_id).await
    }

    pub fn get_session(&self, app_id: &str) -> Option<PlaybackSession> {
        self.sessions.get_session(app_id)
    }

    pub fn watch_session(&self, app_id: &str) -> Option<watch::Receiver<PlaybackSession>> {
        self.sessions.watch_session(app_id)
    }

    /// Wait until the application's session satisfies `predicate`. `None` if
    /// there is no session or the deadline passes first.
    pub async fn wait_for_session<F>(
        &self,
        app_id: &str,
        timeout: Duration,
        mut predicate: F,
    ) -> Option<PlaybackSession>
    where
        F: FnMut(&PlaybackSession) -> bool,
    {
        let mut receiver = self.sessions.watch_session(app_id)?;
        let waited = tokio::time::timeout(timeout, receiver.wait_for(|s| predicate(s))).await;
        match waited {
            Ok(Ok(session)) => Some(session.clone()),
            _ => None,
        }
    }

    /// Number of focus monitoring tasks still alive.
    pub fn active_focus_subscriptions(&self) -> usize {
        self.monitor.active_subscriptions()
    }

    /// Start refreshing every registration at the configured liveness interval.
    /// Calling again while a watch is running does nothing.
    pub fn start_liveness_watch(&self) {
        let mut guard = match self.liveness.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let handle = self
            .registry
            .spawn_liveness_watch(self.settings.liveness_interval(), cancel.clone());
        *guard = Some((cancel, handle));
    }

    /// Stop every running session and the liveness watch.
    pub async fn shutdown(&self) {
        let stopped = self.sessions.stop_all().await;
        log::info!("Shutdown stopped {} playback sessions", stopped.len());

        let watch = match self.liveness.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some((cancel, handle)) = watch {
            cancel.cancel();
            if let Err(err) = handle.await {
                log::error!("Liveness watch failed to join: {err}");
            }
        }
    }
}
