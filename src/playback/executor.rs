use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::models::PlaybackSession;

/// Outcome of one script step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Succeeded,
    Failed { cause: String },
    /// No step exists at the requested index; the script is finished.
    Exhausted,
    /// The step observed its cancellation token and backed out.
    Cancelled,
}

impl StepResult {
    pub fn failed(cause: impl Into<String>) -> Self {
        StepResult::Failed {
            cause: cause.into(),
        }
    }
}

/// Runs recorded script steps against the target application.
///
/// Called at most once at a time per session, only while the session is
/// running. `cancel` fires when the session is stopping; honouring it is
/// optional, but a step that ignores it is abandoned after the stop grace
/// period.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute_step(
        &self,
        session: &PlaybackSession,
        step_index: u64,
        cancel: CancellationToken,
    ) -> StepResult;
}
