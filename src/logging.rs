//! Logging setup
//!
//! Everything logs through the `log` facade. The binary installs
//! `env_logger` once at startup; `RUST_LOG` overrides the default filter.
//!
//! Levels are used consistently across the crate:
//!
//! - `trace!` per-request chatter (attach, damage, commit caching)
//! - `debug!` object and client lifecycle
//! - `info!` startup, socket and device discovery
//! - `warn!` recoverable protocol errors that only drop one request
//! - `error!` fatal protocol errors and I/O failures

use env_logger::{Builder, Env};

/// Filter used when `RUST_LOG` is not set
pub fn default_filter(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

/// Installs the global logger. Calling it twice is harmless; the second
/// call leaves the first logger in place.
pub fn init(debug: bool) {
    let result = Builder::from_env(Env::default().default_filter_or(default_filter(debug)))
        .format_timestamp_millis()
        .try_init();
    if result.is_err() {
        log::debug!("logger already installed");
    }
}

/// Captured logger for tests, so `cargo test -- --nocapture` shows output
pub fn init_for_tests() {
    let _ = Builder::from_env(Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(true), "debug");
        assert_eq!(default_filter(false), "info");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_for_tests();
        init(false);
        init(true);
        log::info!("still logging");
    }
}
