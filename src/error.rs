use thiserror::Error;

use crate::models::SessionState;

/// Failures returned to callers of the playback core.
///
/// Command-level variants never leave partial state behind. Variants raised
/// inside a session loop are recorded on the session as its stop cause.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Application not found: {0}")]
    ApplicationNotFound(String),

    #[error("Application is not running: {0}")]
    ApplicationInactive(String),

    #[error("A playback session is already active for application {0}")]
    AlreadyActive(String),

    #[error("Cannot {command} a session that is {from}")]
    InvalidTransition {
        from: SessionState,
        command: &'static str,
    },

    #[error("An application with executable '{executable_path}' and process '{process_name}' is already registered")]
    DuplicateIdentity {
        executable_path: String,
        process_name: String,
    },

    #[error("Application {0} has an active playback session")]
    SessionActive(String),

    #[error("No playback session for application {0}")]
    SessionNotFound(String),

    #[error("Invalid application: {0}")]
    InvalidApplication(String),

    #[error("Process probe failed: {0}")]
    ProbeFailed(String),

    #[error("Step execution failed: {0}")]
    StepExecutionFailed(String),

    #[error("Focus monitor degraded: {0}")]
    MonitorDegraded(String),

    #[error("Target application lost focus under a strict focus policy")]
    FocusPolicyViolation,

    #[error("Session loop is no longer reachable: {0}")]
    SessionUnavailable(String),
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
