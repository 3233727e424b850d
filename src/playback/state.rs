use chrono::{DateTime, Utc};

use crate::error::{PlaybackError, Result};
use crate::models::{
    FocusLossStrategy, PauseOrigin, PlaybackSession, SessionState, StopCause,
};

impl PlaybackSession {
    pub(crate) fn begin(
        id: String,
        target_app_id: String,
        target_process_id: u32,
        focus_strategy: FocusLossStrategy,
        script_path: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            target_app_id,
            target_process_id,
            state: SessionState::Running,
            pause_origin: None,
            focus_strategy,
            current_step: 0,
            script_path,
            started_at,
            paused_at: None,
            stopped_at: None,
            stop_cause: None,
        }
    }

    /// Returns whether anything changed. Pausing an already paused session is
    /// a no-op, except that an explicit user pause takes ownership of a
    /// policy pause so a returning focus signal no longer lifts it.
    pub(crate) fn pause(&mut self, origin: PauseOrigin, at: DateTime<Utc>) -> Result<bool> {
        match self.state {
            SessionState::Stopped => Err(PlaybackError::InvalidTransition {
                from: self.state,
                command: "pause",
            }),
            SessionState::Paused => {
                if origin == PauseOrigin::User && self.pause_origin == Some(PauseOrigin::Policy) {
                    self.pause_origin = Some(PauseOrigin::User);
                    return Ok(true);
                }
                Ok(false)
            }
            SessionState::Running => {
                self.state = SessionState::Paused;
                self.pause_origin = Some(origin);
                self.paused_at = Some(at);
                Ok(true)
            }
        }
    }

    pub(crate) fn resume(&mut self) -> Result<()> {
        match self.state {
            SessionState::Paused => {
                self.state = SessionState::Running;
                self.pause_origin = None;
                self.paused_at = None;
                Ok(())
            }
            from => Err(PlaybackError::InvalidTransition {
                from,
                command: "resume",
            }),
        }
    }

    /// Terminal transition. Returns `false` if the session was already stopped.
    pub(crate) fn stop(&mut self, cause: StopCause, at: DateTime<Utc>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = SessionState::Stopped;
        self.pause_origin = None;
        self.stopped_at = Some(at);
        self.stop_cause = Some(cause);
        true
    }

    pub(crate) fn record_step_success(&mut self) {
        self.current_step = self.current_step.saturating_add(1);
    }

    /// The error a stopped session ended with, if its stop was not a normal one.
    pub fn terminal_error(&self) -> Option<PlaybackError> {
        match self.stop_cause.as_ref()? {
            StopCause::FocusPolicyViolation => Some(PlaybackError::FocusPolicyViolation),
            StopCause::StepExecutionFailed { cause } => {
                Some(PlaybackError::StepExecutionFailed(cause.clone()))
            }
            StopCause::TargetExited => {
                Some(PlaybackError::ApplicationInactive(self.target_app_id.clone()))
            }
            StopCause::UserStopped | StopCause::ScriptCompleted => None,
        }
    }
}
