//! Tracing setup
//!
//! Maps the client's configured verbosity onto a `tracing` subscriber.
//! Embedding applications that install their own subscriber can skip this
//! entirely; `RUST_LOG` wins over the configured level when set.

use crate::config::LogLevel;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Tracing initialization errors
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("tracing subscriber already initialized")]
    AlreadyInitialized,
}

/// Install a global subscriber at the given verbosity
///
/// Returns an error instead of panicking when a subscriber is already set,
/// so library consumers can call this unconditionally.
pub fn try_init_tracing(level: LogLevel) -> Result<(), TracingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter().to_string()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|_| TracingError::AlreadyInitialized)
}
