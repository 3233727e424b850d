//! The serialized owner of one playback session.
//!
//! All mutation of a session happens here. Three producers feed the loop:
//! the focus subscription, user commands, and the in-flight step. Focus events
//! and commands that arrive while a step is in flight stay queued until that
//! step's result has been applied. A stop request outranks everything still
//! queued.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{PlaybackError, Result};
use crate::focus::{
    resolve, FocusAction, FocusEvent, FocusEventKind, FocusMonitor, FocusSignal,
    FocusSubscription, SessionPhase,
};
use crate::models::{PauseOrigin, PlaybackSession, SessionState, StopCause};

use super::executor::{StepExecutor, StepResult};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

pub(crate) type Reply = oneshot::Sender<Result<PlaybackSession>>;

pub(crate) enum SessionCommand {
    Pause { reply: Reply },
    Resume { reply: Reply },
}

impl SessionCommand {
    fn name(&self) -> &'static str {
        match self {
            SessionCommand::Pause { .. } => "pause",
            SessionCommand::Resume { .. } => "resume",
        }
    }

    fn into_reply(self) -> Reply {
        match self {
            SessionCommand::Pause { reply } | SessionCommand::Resume { reply } => reply,
        }
    }
}

struct InFlightStep {
    index: u64,
    handle: JoinHandle<StepResult>,
    cancel: CancellationToken,
}

pub(crate) struct SessionLoop {
    session: PlaybackSession,
    snapshot: watch::Sender<PlaybackSession>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    focus: FocusSubscription,
    /// Latest focus signal; `None` until the first sample arrives.
    last_signal: Option<FocusSignal>,
    monitor: Arc<FocusMonitor>,
    executor: Arc<dyn StepExecutor>,
    stop_requested: CancellationToken,
    stop_grace: Duration,
}

impl SessionLoop {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session: PlaybackSession,
        snapshot: watch::Sender<PlaybackSession>,
        commands: mpsc::UnboundedReceiver<SessionCommand>,
        focus: FocusSubscription,
        monitor: Arc<FocusMonitor>,
        executor: Arc<dyn StepExecutor>,
        stop_requested: CancellationToken,
        stop_grace: Duration,
    ) -> Self {
        Self {
            session,
            snapshot,
            commands,
            focus,
            last_signal: None,
            monitor,
            executor,
            stop_requested,
            stop_grace,
        }
    }

    pub(crate) async fn run(mut self) {
        log_info!(
            "Session {} started for app {} (pid {}, strategy {})",
            self.session.id,
            self.session.target_app_id,
            self.session.target_process_id,
            self.session.focus_strategy
        );

        let mut in_flight: Option<InFlightStep> = None;
        let mut focus_open = true;

        let cause = loop {
            if in_flight.is_none() {
                // Step boundary
                if self.stop_requested.is_cancelled() {
                    break StopCause::UserStopped;
                }
                if let Some(cause) = self.apply_queued(&mut focus_open) {
                    break cause;
                }
                // The first step waits for the first focus sample
                let focus_known = self.last_signal.is_some() || !focus_open;
                if self.session.state == SessionState::Running && focus_known {
                    in_flight = Some(self.dispatch_step());
                }
            }
            let idle = in_flight.is_none();

            tokio::select! {
                biased;

                _ = self.stop_requested.cancelled() => break StopCause::UserStopped,

                command = self.commands.recv(), if idle => match command {
                    Some(command) => {
                        if let Some(cause) = self.handle_command(command) {
                            break cause;
                        }
                    }
                    None => {
                        log_warn!("Session {} lost its owner; stopping", self.session.id);
                        break StopCause::UserStopped;
                    }
                },

                event = self.focus.events.recv(), if idle && focus_open => match event {
                    Some(event) => {
                        if let Some(cause) = self.handle_focus(event) {
                            break cause;
                        }
                    }
                    None => self.focus_closed(&mut focus_open),
                },

                result = wait_step(&mut in_flight) => {
                    let index = in_flight.take().map(|step| step.index).unwrap_or_default();
                    if let Some(cause) = self.apply_step_result(index, result) {
                        break cause;
                    }
                }
            }
        };

        self.finish(cause, in_flight).await;
    }

    /// Apply focus events, then commands, that queued up while a step ran.
    fn apply_queued(&mut self, focus_open: &mut bool) -> Option<StopCause> {
        while *focus_open {
            match self.focus.events.try_recv() {
                Ok(event) => {
                    if let Some(cause) = self.handle_focus(event) {
                        return Some(cause);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.focus_closed(focus_open),
            }
        }

        loop {
            match self.commands.try_recv() {
                Ok(command) => {
                    if let Some(cause) = self.handle_command(command) {
                        return Some(cause);
                    }
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => {
                    log_warn!("Session {} lost its owner; stopping", self.session.id);
                    return Some(StopCause::UserStopped);
                }
            }
        }
    }

    fn focus_closed(&mut self, focus_open: &mut bool) {
        log_warn!("Session {}: focus monitor ended", self.session.id);
        *focus_open = false;
    }

    fn dispatch_step(&self) -> InFlightStep {
        let index = self.session.current_step;
        let cancel = CancellationToken::new();
        let executor = Arc::clone(&self.executor);
        let snapshot = self.session.clone();
        let step_cancel = cancel.clone();

        log_debug!("Session {}: dispatching step {index}", self.session.id);

        let handle = tokio::spawn(async move {
            executor.execute_step(&snapshot, index, step_cancel).await
        });

        InFlightStep {
            index,
            handle,
            cancel,
        }
    }

    /// Returns a stop cause when the command ends the session.
    fn handle_command(&mut self, command: SessionCommand) -> Option<StopCause> {
        let name = command.name();
        let (result, cause) = match &command {
            SessionCommand::Pause { .. } => {
                let paused = self
                    .session
                    .pause(PauseOrigin::User, Utc::now())
                    .map(|changed| {
                        if changed {
                            log_info!("Session {} paused by user", self.session.id);
                            self.publish();
                        }
                    });
                (paused, None)
            }
            SessionCommand::Resume { .. } => self.resume_by_user(),
        };

        if let Err(err) = &result {
            log_debug!("Session {}: {name} rejected: {err}", self.session.id);
        }

        let _ = command
            .into_reply()
            .send(result.map(|()| self.session.clone()));
        cause
    }

    /// A user resume while the target is unfocused (or focus is unknown) is
    /// immediately run back through the resolver.
    fn resume_by_user(&mut self) -> (Result<()>, Option<StopCause>) {
        if let Err(err) = self.session.resume() {
            return (Err(err), None);
        }
        log_info!("Session {} resumed by user", self.session.id);

        let unfocused = self
            .last_signal
            .filter(|signal| *signal != FocusSignal::Gained);
        if let Some(signal) = unfocused {
            match resolve(SessionPhase::Running, self.session.focus_strategy, signal) {
                FocusAction::PauseSession => {
                    if let Ok(true) = self.session.pause(PauseOrigin::Policy, Utc::now()) {
                        log_info!(
                            "Session {} paused again: target still without focus ({:?})",
                            self.session.id,
                            signal
                        );
                    }
                }
                FocusAction::StopWithError => {
                    log_warn!(
                        "Session {} stopping on resume: {}",
                        self.session.id,
                        PlaybackError::FocusPolicyViolation
                    );
                    return (
                        Err(PlaybackError::FocusPolicyViolation),
                        Some(StopCause::FocusPolicyViolation),
                    );
                }
                FocusAction::Continue | FocusAction::NoOp => {}
            }
        }

        self.publish();
        (Ok(()), None)
    }

    /// Returns a stop cause when the event ends the session.
    fn handle_focus(&mut self, event: FocusEvent) -> Option<StopCause> {
        let Some(signal) = event.signal() else {
            log_warn!(
                "Session {}: target pid {} exited",
                self.session.id,
                self.session.target_process_id
            );
            return Some(StopCause::TargetExited);
        };

        self.last_signal = Some(signal);

        if let FocusEventKind::Degraded { reason } = &event.kind {
            log_warn!(
                "Session {}: {}; assuming focus lost",
                self.session.id,
                PlaybackError::MonitorDegraded(reason.clone())
            );
        }

        let phase = SessionPhase::of(&self.session);
        let action = resolve(phase, self.session.focus_strategy, signal);
        log_debug!(
            "Session {}: focus {:?} in {:?} -> {:?}",
            self.session.id,
            signal,
            phase,
            action
        );

        match action {
            FocusAction::PauseSession => {
                if let Ok(true) = self.session.pause(PauseOrigin::Policy, event.at) {
                    log_info!("Session {} paused: target lost focus", self.session.id);
                    self.publish();
                }
                None
            }
            FocusAction::Continue => {
                if self.session.state == SessionState::Paused && self.session.resume().is_ok() {
                    log_info!("Session {} resumed: target regained focus", self.session.id);
                    self.publish();
                }
                None
            }
            FocusAction::StopWithError => {
                log_warn!(
                    "Session {} stopping: {}",
                    self.session.id,
                    PlaybackError::FocusPolicyViolation
                );
                Some(StopCause::FocusPolicyViolation)
            }
            FocusAction::NoOp => None,
        }
    }

    fn apply_step_result(&mut self, index: u64, result: StepResult) -> Option<StopCause> {
        match result {
            StepResult::Succeeded => {
                self.session.record_step_success();
                log_debug!(
                    "Session {}: step {index} done, current_step={}",
                    self.session.id,
                    self.session.current_step
                );
                self.publish();
                None
            }
            StepResult::Failed { cause } => {
                log_error!("Session {}: step {index} failed: {cause}", self.session.id);
                Some(StopCause::StepExecutionFailed { cause })
            }
            StepResult::Exhausted => {
                log_info!(
                    "Session {}: script finished after {} steps",
                    self.session.id,
                    self.session.current_step
                );
                Some(StopCause::ScriptCompleted)
            }
            StepResult::Cancelled => {
                // Nobody asked the step to cancel
                log_error!(
                    "Session {}: step {index} cancelled without a stop request",
                    self.session.id
                );
                Some(StopCause::StepExecutionFailed {
                    cause: format!("step {index} was cancelled unexpectedly"),
                })
            }
        }
    }

    async fn finish(mut self, cause: StopCause, in_flight: Option<InFlightStep>) {
        if let Some(mut step) = in_flight {
            step.cancel.cancel();
            match tokio::time::timeout(self.stop_grace, &mut step.handle).await {
                Ok(Ok(StepResult::Succeeded)) => self.session.record_step_success(),
                Ok(Ok(StepResult::Failed { cause: failure })) => log_warn!(
                    "Session {}: step {} failed while stopping: {failure}",
                    self.session.id,
                    step.index
                ),
                Ok(Ok(_)) => {}
                Ok(Err(join_err)) => log_error!(
                    "Session {}: step {} task failed: {join_err}",
                    self.session.id,
                    step.index
                ),
                Err(_) => {
                    log_warn!(
                        "Session {}: step {} did not finish within {}ms; abandoning it",
                        self.session.id,
                        step.index,
                        self.stop_grace.as_millis()
                    );
                    step.handle.abort();
                }
            }
        }

        self.monitor.unsubscribe(&self.focus.handle);

        self.session.stop(cause.clone(), Utc::now());
        if cause.is_error() {
            log_warn!(
                "Session {} stopped with error at step {} ({:?})",
                self.session.id,
                self.session.current_step,
                cause
            );
        } else {
            log_info!(
                "Session {} stopped at step {} ({:?})",
                self.session.id,
                self.session.current_step,
                cause
            );
        }
        self.publish();

        // Commands that raced with the stop see the terminal state
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            let name = command.name();
            let _ = command.into_reply().send(Err(PlaybackError::InvalidTransition {
                from: SessionState::Stopped,
                command: name,
            }));
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.session.clone());
    }
}

async fn wait_step(in_flight: &mut Option<InFlightStep>) -> StepResult {
    match in_flight {
        Some(step) => match (&mut step.handle).await {
            Ok(result) => result,
            Err(join_err) => StepResult::failed(format!("step task failed: {join_err}")),
        },
        None => std::future::pending().await,
    }
}
