use serde::{Deserialize, Serialize};

/// How a running session reacts when its target loses OS input focus.
///
/// Resolved once when playback starts and fixed for the session's lifetime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum FocusLossStrategy {
    /// Pause on focus loss, resume automatically when focus returns.
    AutoPause,
    /// Stop the session with a policy violation on focus loss.
    StrictError,
    /// Keep executing steps while out of focus.
    Ignore,
}

impl Default for FocusLossStrategy {
    fn default() -> Self {
        FocusLossStrategy::AutoPause
    }
}

impl FocusLossStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FocusLossStrategy::AutoPause => "AutoPause",
            FocusLossStrategy::StrictError => "StrictError",
            FocusLossStrategy::Ignore => "Ignore",
        }
    }
}

impl std::fmt::Display for FocusLossStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
