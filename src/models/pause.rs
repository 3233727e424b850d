use serde::{Deserialize, Serialize};

/// Why a session is paused. Both read as `Paused` externally, but only
/// policy pauses are lifted by a returning focus signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PauseOrigin {
    User,
    Policy,
}
