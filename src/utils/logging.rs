//! Logger setup plus macros gated on a module-level `ENABLE_LOGS` flag.
//!
//! Modules with hot paths (the reconciliation loop, stream parsing) declare
//! `const ENABLE_LOGS: bool = ...;` and log through these macros so their
//! output can be silenced without touching `RUST_LOG`.

/// Installs `env_logger` reading `RUST_LOG`. The fallback level is `Debug` when
/// `debug` is set and `Info` otherwise. Safe to call more than once.
pub fn init(debug: bool) {
    let fallback = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let _ = env_logger::Builder::new()
        .filter_level(fallback)
        .parse_default_env()
        .try_init();
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
