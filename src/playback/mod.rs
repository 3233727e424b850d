pub mod controller;
pub mod executor;
mod session_loop;
mod state;

pub use controller::PlaybackSessionManager;
pub use executor::{StepExecutor, StepResult};
