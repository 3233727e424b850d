pub mod application;
pub mod pause;
pub mod session;
pub mod strategy;

pub use application::{ApplicationStatus, IdentityHints, NewApplication, RegisteredApplication};
pub use pause::PauseOrigin;
pub use session::{PlaybackSession, SessionState, StopCause};
pub use strategy::FocusLossStrategy;
