//! Logging setup plus per-module switchable logging macros.
//!
//! Modules that want a kill switch for their own chatter define
//! `const ENABLE_LOGS: bool` and then call the macros exported at the crate
//! root:
//!
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_info, log_warn};
//!
//! log_info!("pushed channel {}", channel);
//! ```

use std::sync::Once;

static INIT: Once = Once::new();

/// Install `env_logger` once for the process. `RUST_LOG` overrides the
/// default `info` level; later calls are no-ops.
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(log::LevelFilter::Info)
            .parse_default_env()
            .try_init();
    });
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

/// Sync and decode failures go through here; they are never surfaced to the UI.
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
