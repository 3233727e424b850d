use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{PlaybackError, Result};
use crate::focus::FocusMonitor;
use crate::models::{FocusLossStrategy, PlaybackSession, SessionState};
use crate::registry::{ApplicationRegistry, SessionGuard};

use super::executor::StepExecutor;
use super::session_loop::{Reply, SessionCommand, SessionLoop};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Everything the manager keeps about a session; the session itself lives in
/// its loop.
struct SessionSlot {
    session_id: String,
    commands: mpsc::UnboundedSender<SessionCommand>,
    snapshot: watch::Receiver<PlaybackSession>,
    stop: CancellationToken,
}

impl SessionSlot {
    fn current(&self) -> PlaybackSession {
        self.snapshot.borrow().clone()
    }

    fn is_active(&self) -> bool {
        !self.snapshot.borrow().is_terminal()
    }
}

/// Owns at most one non-terminal session per target application.
///
/// The most recent session per application (terminal or not) stays queryable
/// until a new one replaces it.
pub struct PlaybackSessionManager {
    registry: Arc<ApplicationRegistry>,
    monitor: Arc<FocusMonitor>,
    executor: Arc<dyn StepExecutor>,
    sessions: Mutex<HashMap<String, SessionSlot>>,
    stop_grace: Duration,
}

impl PlaybackSessionManager {
    pub fn new(
        registry: Arc<ApplicationRegistry>,
        monitor: Arc<FocusMonitor>,
        executor: Arc<dyn StepExecutor>,
        stop_grace: Duration,
    ) -> Self {
        Self {
            registry,
            monitor,
            executor,
            sessions: Mutex::new(HashMap::new()),
            stop_grace,
        }
    }

    /// Start playback against the application's live process. `strategy`
    /// overrides the application's default for this session only.
    pub async fn start(
        &self,
        app_id: &str,
        strategy: Option<FocusLossStrategy>,
        script_path: Option<String>,
    ) -> Result<PlaybackSession> {
        // Held until the session is inserted so removal cannot interleave
        let apps = self.registry.read().await;

        let app = apps
            .iter()
            .find(|app| app.id == app_id)
            .ok_or_else(|| PlaybackError::ApplicationNotFound(app_id.to_string()))?;

        let process_id = app
            .process_id
            .filter(|_| app.is_active())
            .ok_or_else(|| PlaybackError::ApplicationInactive(app_id.to_string()))?;

        let mut sessions = self.lock_sessions();
        if sessions.get(app_id).is_some_and(SessionSlot::is_active) {
            return Err(PlaybackError::AlreadyActive(app_id.to_string()));
        }

        let session = PlaybackSession::begin(
            Uuid::new_v4().to_string(),
            app_id.to_string(),
            process_id,
            strategy.unwrap_or(app.default_focus_strategy),
            script_path,
            Utc::now(),
        );

        let subscription = self.monitor.subscribe(process_id);
        let (snapshot_tx, snapshot_rx) = watch::channel(session.clone());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();

        let worker = SessionLoop::new(
            session.clone(),
            snapshot_tx,
            commands_rx,
            subscription,
            Arc::clone(&self.monitor),
            Arc::clone(&self.executor),
            stop.clone(),
            self.stop_grace,
        );
        tokio::spawn(worker.run());

        if let Some(previous) = sessions.insert(
            app_id.to_string(),
            SessionSlot {
                session_id: session.id.clone(),
                commands: commands_tx,
                snapshot: snapshot_rx,
                stop,
            },
        ) {
            log_info!(
                "Session {} for {} replaces finished session {}",
                session.id,
                app.name,
                previous.session_id
            );
        }

        Ok(session)
    }

    /// Pause and resume reply once applied, which waits for the step in
    /// flight (if any) to finish.
    pub async fn pause(&self, app_id: &str) -> Result<PlaybackSession> {
        self.send_command(app_id, |reply| SessionCommand::Pause { reply })
            .await
    }

    pub async fn resume(&self, app_id: &str) -> Result<PlaybackSession> {
        self.send_command(app_id, |reply| SessionCommand::Resume { reply })
            .await
    }

    /// Stop the session and wait for its terminal snapshot. Stopping a session
    /// that is already stopped returns that snapshot unchanged.
    pub async fn stop(&self, app_id: &str) -> Result<PlaybackSession> {
        let (mut snapshot, stop) = {
            let sessions = self.lock_sessions();
            let slot = sessions
                .get(app_id)
                .ok_or_else(|| PlaybackError::SessionNotFound(app_id.to_string()))?;
            (slot.snapshot.clone(), slot.stop.clone())
        };

        if snapshot.borrow().is_terminal() {
            return Ok(snapshot.borrow().clone());
        }

        stop.cancel();

        let stopped = snapshot
            .wait_for(PlaybackSession::is_terminal)
            .await
            .map(|session| session.clone())
            .map_err(|_| PlaybackError::SessionUnavailable(app_id.to_string()))?;
        Ok(stopped)
    }

    /// Stop every non-terminal session.
    pub async fn stop_all(&self) -> Vec<PlaybackSession> {
        let active: Vec<String> = self
            .lock_sessions()
            .iter()
            .filter(|(_, slot)| slot.is_active())
            .map(|(app_id, _)| app_id.clone())
            .collect();

        let mut stopped = Vec::with_capacity(active.len());
        for app_id in active {
            match self.stop(&app_id).await {
                Ok(session) => stopped.push(session),
                Err(err) => log_warn!("Failed to stop session for {app_id}: {err}"),
            }
        }
        stopped
    }

    pub fn get_session(&self, app_id: &str) -> Option<PlaybackSession> {
        self.lock_sessions().get(app_id).map(SessionSlot::current)
    }

    pub fn watch_session(&self, app_id: &str) -> Option<watch::Receiver<PlaybackSession>> {
        self.lock_sessions()
            .get(app_id)
            .map(|slot| slot.snapshot.clone())
    }

    pub fn active_sessions(&self) -> Vec<PlaybackSession> {
        self.lock_sessions()
            .values()
            .filter(|slot| slot.is_active())
            .map(SessionSlot::current)
            .collect()
    }

    async fn send_command<F>(&self, app_id: &str, build: F) -> Result<PlaybackSession>
    where
        F: FnOnce(Reply) -> SessionCommand,
    {
        let (commands, snapshot) = {
            let sessions = self.lock_sessions();
            let slot = sessions
                .get(app_id)
                .ok_or_else(|| PlaybackError::SessionNotFound(app_id.to_string()))?;
            (slot.commands.clone(), slot.snapshot.clone())
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let command = build(reply_tx);
        let name = match &command {
            SessionCommand::Pause { .. } => "pause",
            SessionCommand::Resume { .. } => "resume",
        };

        let loop_gone = || {
            let from = snapshot.borrow().state;
            if from == SessionState::Stopped {
                PlaybackError::InvalidTransition {
                    from,
                    command: name,
                }
            } else {
                PlaybackError::SessionUnavailable(app_id.to_string())
            }
        };

        if commands.send(command).is_err() {
            return Err(loop_gone());
        }

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(loop_gone()),
        }
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<String, SessionSlot>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SessionGuard for PlaybackSessionManager {
    fn has_active_session(&self, app_id: &str) -> bool {
        self.lock_sessions()
            .get(app_id)
            .is_some_and(SessionSlot::is_active)
    }
}
