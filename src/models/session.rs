//! Playback session snapshots.
//!
//! A `PlaybackSession` is owned and mutated by its session loop only; callers
//! receive clones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FocusLossStrategy, PauseOrigin};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Running,
    Paused,
    Stopped,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Running => "Running",
            SessionState::Paused => "Paused",
            SessionState::Stopped => "Stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session reached `Stopped`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StopCause {
    UserStopped,
    FocusPolicyViolation,
    StepExecutionFailed { cause: String },
    ScriptCompleted,
    TargetExited,
}

impl StopCause {
    /// User stops and natural completion are not errors.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            StopCause::FocusPolicyViolation
                | StopCause::StepExecutionFailed { .. }
                | StopCause::TargetExited
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSession {
    pub id: String,
    pub target_app_id: String,
    pub target_process_id: u32,
    pub state: SessionState,
    /// Present only while `state == Paused`.
    pub pause_origin: Option<PauseOrigin>,
    pub focus_strategy: FocusLossStrategy,
    pub current_step: u64,
    pub script_path: Option<String>,
    pub started_at: DateTime<Utc>,
    pub paused_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub stop_cause: Option<StopCause>,
}

impl PlaybackSession {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
