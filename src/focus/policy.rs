//! Pure mapping from (session phase, strategy, focus signal) to an action.
//!
//! Side effects belong to the session loop; nothing here touches a session.

use serde::Serialize;

use crate::models::{FocusLossStrategy, PauseOrigin, PlaybackSession, SessionState};

/// Focus information as the resolver sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FocusSignal {
    Gained,
    Lost,
    /// Focus is unknown; resolved the same way as `Lost`.
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FocusAction {
    /// Keep (or return to) running.
    Continue,
    PauseSession,
    StopWithError,
    NoOp,
}

/// Session state with the pause sub-tag the resolver distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Running,
    Paused(PauseOrigin),
    Stopped,
}

impl SessionPhase {
    pub fn of(session: &PlaybackSession) -> Self {
        match session.state {
            SessionState::Running => SessionPhase::Running,
            // A paused snapshot without an origin came from an explicit command
            SessionState::Paused => {
                SessionPhase::Paused(session.pause_origin.unwrap_or(PauseOrigin::User))
            }
            SessionState::Stopped => SessionPhase::Stopped,
        }
    }
}

pub fn resolve(phase: SessionPhase, strategy: FocusLossStrategy, signal: FocusSignal) -> FocusAction {
    use FocusLossStrategy::*;

    match (phase, signal) {
        (SessionPhase::Stopped, _) => FocusAction::NoOp,

        (SessionPhase::Running, FocusSignal::Lost | FocusSignal::Degraded) => match strategy {
            AutoPause => FocusAction::PauseSession,
            StrictError => FocusAction::StopWithError,
            Ignore => FocusAction::NoOp,
        },
        (SessionPhase::Running, FocusSignal::Gained) => FocusAction::NoOp,

        (SessionPhase::Paused(_), FocusSignal::Lost | FocusSignal::Degraded) => FocusAction::NoOp,
        (SessionPhase::Paused(PauseOrigin::Policy), FocusSignal::Gained) => match strategy {
            AutoPause => FocusAction::Continue,
            StrictError | Ignore => FocusAction::NoOp,
        },
        (SessionPhase::Paused(PauseOrigin::User), FocusSignal::Gained) => FocusAction::NoOp,
    }
}
