//! Logger setup and conditional logging macros.
//!
//! The macros check a module-level `ENABLE_LOGS` flag so chatty loops can be
//! silenced per module:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_debug, log_info, log_warn, log_error};
//!
//! log_info!("focus changed for pid {}", pid);
//! ```

/// Initialize `env_logger` from `RUST_LOG`, defaulting to `Info` (or `Debug`
/// when `verbose`). Safe to call more than once.
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

/// `FOCUSPLAY_DEBUG=1` or `FOCUSPLAY_DEBUG=true` enables verbose logging.
pub fn debug_mode_from_env() -> bool {
    std::env::var("FOCUSPLAY_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
