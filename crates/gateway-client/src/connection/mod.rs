//! Connection state machine and the client handle.

mod client;
mod members;
mod state;

pub use client::GatewayClient;
pub use state::ConnectionState;
