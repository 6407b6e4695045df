//! Application-facing event stream
//!
//! The fixed set of events the client emits, delivered in emission order
//! over an unbounded channel handed out at construction.

use crate::protocol::GatewayMessage;
use serde_json::Value;
use tokio::sync::mpsc;

/// Receiving half of the client's event stream
pub type EventReceiver = mpsc::UnboundedReceiver<GatewayEvent>;

/// Events emitted by the client
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// The transport connected (authentication has not completed yet)
    Connect,

    /// The transport closed; reconnection follows automatically unless disabled
    Disconnect {
        /// Close code reported by the transport, when one was received
        code: Option<u16>,
    },

    /// No resumable session is available; state built from past events must
    /// be rebuilt from fresh creation events
    ResumeError {
        /// Unix milliseconds of the disconnect the lost session covered
        disconnect_time: Option<i64>,
    },

    /// A dispatched application event, passed through opaquely
    Event {
        /// Dispatch event type
        event_type: String,
        /// Dispatch payload
        payload: Value,
    },

    /// Every inbound message verbatim, control opcodes included
    Raw {
        /// The full message envelope
        message: GatewayMessage,
    },
}

impl GatewayEvent {
    /// Short name for logging
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::ResumeError { .. } => "resumeError",
            Self::Event { .. } => "event",
            Self::Raw { .. } => "rawEvent",
        }
    }
}
