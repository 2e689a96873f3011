//! Logging utilities
//!
//! The crate logs through the [`log`] facade; installing a backend is the
//! host application's choice. [`init`] installs the stock `env_logger`
//! backend for hosts that do not bring their own.

pub use log::{debug, error, info, trace, warn};

/// Install the default `env_logger` backend. Call once at startup.
pub fn init() {
    env_logger::init();
}

/// Install the default backend, ignoring an already-installed logger.
///
/// Safe to call from every test; only the first call wins.
pub fn try_init() {
    let _ = env_logger::builder().is_test(true).try_init();
}
