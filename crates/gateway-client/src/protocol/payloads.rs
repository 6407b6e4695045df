//! Payload definitions for the opcodes the client interprets or sends.

use super::Intents;
use serde::{Deserialize, Serialize};

/// Payload for op 10 (Hello)
///
/// Sent by the server immediately after connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

/// Payload for op 2 (Identify)
///
/// Sent by the client to authenticate a fresh session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Credential token
    pub token: String,

    /// Client connection properties
    pub properties: IdentifyProperties,

    /// Request transport-level payload compression
    pub compress: bool,

    /// Member count above which a collection is considered "large"
    pub large_threshold: u32,

    /// Shard assignment `[index, total]` (absent when unsharded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,

    /// Subscribed-event-categories bitmask
    pub intents: Intents,
}

/// Client connection properties reported in Identify
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyProperties {
    /// Operating system
    #[serde(rename = "$os", skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,

    /// Browser or client name
    #[serde(rename = "$browser", skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,

    /// Device type
    #[serde(rename = "$device", skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl IdentifyProperties {
    /// Properties identifying this library
    #[must_use]
    pub fn this_client() -> Self {
        Self {
            os: Some(std::env::consts::OS.to_string()),
            browser: Some(env!("CARGO_PKG_NAME").to_string()),
            device: None,
        }
    }
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self::this_client()
    }
}

/// Payload for op 6 (Resume)
///
/// Sent by the client to re-attach to a previous session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    /// Credential token
    pub token: String,

    /// Session ID to resume
    pub session_id: String,

    /// Last received sequence number
    pub seq: u64,
}

/// Payload for op 8 (Request Members)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMembersPayload {
    /// Collection identifier whose members are requested
    pub guild_id: String,

    /// Username prefix filter (empty = no filter)
    pub query: String,

    /// Maximum members to return (0 = all)
    pub limit: u32,
}

impl RequestMembersPayload {
    /// Request the full member list of a collection
    #[must_use]
    pub fn all_members(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            query: String::new(),
            limit: 0,
        }
    }
}
