//! Wire protocol: opcodes, message envelope, payloads, and intents.

mod intents;
mod messages;
mod opcodes;
mod payloads;

pub use intents::Intents;
pub use messages::GatewayMessage;
pub use opcodes::OpCode;
pub use payloads::{
    HelloPayload, IdentifyPayload, IdentifyProperties, RequestMembersPayload, ResumePayload,
};

/// Gateway protocol version requested during discovery
pub const GATEWAY_VERSION: u8 = 9;

/// Query string appended to the discovered gateway address
#[must_use]
pub fn gateway_query() -> String {
    format!("/?encoding=json&v={GATEWAY_VERSION}")
}
