//! Telemetry - Structured Logging Setup
//!
//! The engine emits structured `tracing` events and spans everywhere it
//! touches storage; this module installs the global subscriber that makes
//! them visible. Embedding applications call [`init_tracing`] once at
//! startup (or install their own subscriber and skip this entirely; the
//! engine only ever emits, it never requires a subscriber).
//!
//! ```rust,no_run
//! fichario_engine::telemetry::init_tracing("info,fichario_engine=debug")
//!     .expect("tracing init");
//! ```

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Errors installing the global subscriber.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The filter directive string does not parse.
    #[error("invalid filter directive '{directive}': {reason}")]
    InvalidFilter {
        /// The rejected directive string.
        directive: String,
        /// Parser output.
        reason: String,
    },

    /// A global subscriber is already installed.
    #[error("tracing subscriber already installed: {reason}")]
    AlreadyInitialized {
        /// Init output.
        reason: String,
    },
}

/// Install the global tracing subscriber with the given filter directives
/// (same syntax as `RUST_LOG`, e.g. `"info,fichario_engine=debug"`).
///
/// # Errors
///
/// `InvalidFilter` for a malformed directive string, `AlreadyInitialized`
/// when a subscriber is already installed (tests installing per-process
/// subscribers hit this; it is safe to ignore).
pub fn init_tracing(filter: &str) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_new(filter).map_err(|e| TelemetryError::InvalidFilter {
            directive: filter.to_string(),
            reason: e.to_string(),
        })?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(env_filter)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialized {
            reason: e.to_string(),
        })?;

    tracing::debug!(filter, "tracing initialized");
    Ok(())
}

/// Install the global subscriber from `RUST_LOG`, falling back to `info`.
///
/// # Errors
///
/// Same as [`init_tracing`].
pub fn init_tracing_from_env() -> Result<(), TelemetryError> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    init_tracing(&filter)
}
