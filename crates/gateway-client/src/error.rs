//! Client error types
//!
//! Unified error taxonomy for the client. Most failures are handled
//! internally by the reconnect machinery; only configuration problems and
//! fatal per-connection conditions surface through these types.

use crate::compression::InflateError;
use crate::config::ConfigError;

/// Client-wide error type
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    // Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    // Gateway discovery errors (retried; surfaced only per attempt)
    #[error("gateway discovery failed: {0}")]
    Discovery(#[from] reqwest::Error),

    // Transport errors
    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    // Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Stream decompression errors (fatal for the current connection)
    #[error(transparent)]
    Inflate(#[from] InflateError),
}

impl GatewayError {
    /// Whether this error ends only the current connection rather than the client
    #[must_use]
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Inflate(_))
    }
}
