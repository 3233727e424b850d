pub mod logging;

pub use logging::{debug_mode_from_env, init_logging};
