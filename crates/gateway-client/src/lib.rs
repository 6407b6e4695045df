//! # gateway-client
//!
//! Resumable WebSocket client for a gateway push protocol: it keeps one
//! long-lived connection to the dispatch service, authenticates or resumes
//! a session, heartbeats on the server's schedule, reassembles paginated
//! large collections, and delivers an ordered stream of application events
//! while reconnecting transparently after any disconnect.
//!
//! ```no_run
//! use gateway_client::{ClientConfig, GatewayClient, GatewayEvent};
//!
//! # async fn run() -> Result<(), gateway_client::GatewayError> {
//! let config = ClientConfig::new("token").resumable();
//! let (client, mut events) = GatewayClient::new(config)?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         GatewayEvent::Event { event_type, payload } => {
//!             println!("{event_type}: {payload}");
//!         }
//!         GatewayEvent::Disconnect { code } => {
//!             println!("disconnected ({code:?}), reconnecting");
//!         }
//!         _ => {}
//!     }
//! }
//! # let _ = client;
//! # Ok(())
//! # }
//! ```

pub mod compression;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod protocol;
pub mod rest;
pub mod retry;
pub mod session;
pub mod telemetry;

pub use compression::{InflateError, InflateStream};
pub use config::{ClientConfig, ConfigError, LogLevel};
pub use connection::{ConnectionState, GatewayClient};
pub use error::GatewayError;
pub use events::{EventReceiver, GatewayEvent};
pub use protocol::{GatewayMessage, Intents, OpCode};
pub use session::{SessionRecord, SessionStore};
