//! Opt-in tracing setup
//!
//! The library only emits `tracing` events; nothing is installed on import.
//! Applications that have no subscriber of their own can call
//! [`init_tracing`] once at startup.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::{Result, TelloError};

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"tellolink=debug"`).
///
/// Returns an error instead of panicking if a global subscriber is already set.
pub fn init_tracing(default_directive: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| {
            TelloError::config_error_with_source(
                format!("Invalid log directive '{}'", default_directive),
                Box::new(e),
            )
        })?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_line_number(true),
        )
        .with(filter)
        .try_init()
        .map_err(|e| {
            TelloError::config_error_with_source("Tracing already initialized", Box::new(e))
        })
}
