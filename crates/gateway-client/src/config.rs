//! Client configuration
//!
//! Programmatic configuration for one gateway connection, builder style.

use crate::protocol::Intents;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

/// Default REST base used to discover the gateway address
pub const DEFAULT_API_URL: &str = "https://discord.com/api";

/// Default member count above which a collection is considered "large"
pub const DEFAULT_LARGE_THRESHOLD: u32 = 250;

/// Default path of the persisted session state file
pub const DEFAULT_STATE_PATH: &str = ".socket.json";

/// Log verbosity of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// No client logging at all
    None,
    /// Only failures
    #[default]
    Error,
    /// Connection lifecycle
    Info,
    /// Every message in both directions
    Debug,
}

impl LogLevel {
    /// The `tracing` filter this verbosity maps onto
    #[must_use]
    pub fn as_filter(self) -> LevelFilter {
        match self {
            Self::None => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
        }
    }
}

/// Configuration for a [`GatewayClient`](crate::GatewayClient)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Credential token
    pub token: String,

    /// Shard assignment `[index, total]`; `None` disables sharding
    pub shard: Option<[u32; 2]>,

    /// Subscribed-event-categories bitmask
    pub intents: Intents,

    /// Persist and reload session state across processes
    pub resume_capable: bool,

    /// Ignore any persisted state and always identify fresh
    pub force_fresh: bool,

    /// Reassemble large collections into single merged creation events
    pub reassemble_members: bool,

    /// Member count above which the server omits a collection's member list
    pub large_threshold: u32,

    /// Client log verbosity
    pub log_level: LogLevel,

    /// Begin connecting as soon as the client is constructed
    pub auto_connect: bool,

    /// REST base URL for gateway discovery
    pub api_url: String,

    /// Fixed gateway address, skipping discovery entirely
    pub gateway_url: Option<String>,

    /// Path of the persisted session state file
    pub state_path: PathBuf,
}

impl ClientConfig {
    /// Create a configuration with defaults for everything but the token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            shard: None,
            intents: Intents::unprivileged(),
            resume_capable: false,
            force_fresh: false,
            reassemble_members: true,
            large_threshold: DEFAULT_LARGE_THRESHOLD,
            log_level: LogLevel::default(),
            auto_connect: true,
            api_url: DEFAULT_API_URL.to_string(),
            gateway_url: None,
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
        }
    }

    /// Set the shard assignment `[index, total]`
    #[must_use]
    pub fn with_shard(mut self, index: u32, total: u32) -> Self {
        self.shard = Some([index, total]);
        self
    }

    /// Set the subscribed event categories
    #[must_use]
    pub fn with_intents(mut self, intents: Intents) -> Self {
        self.intents = intents;
        self
    }

    /// Enable persisting and resuming sessions across processes
    #[must_use]
    pub fn resumable(mut self) -> Self {
        self.resume_capable = true;
        self
    }

    /// Ignore persisted state on startup and identify fresh
    #[must_use]
    pub fn force_fresh_session(mut self) -> Self {
        self.force_fresh = true;
        self
    }

    /// Pass creation and member-chunk events through without reassembly
    #[must_use]
    pub fn without_member_reassembly(mut self) -> Self {
        self.reassemble_members = false;
        self
    }

    /// Set the large-collection threshold sent in Identify
    #[must_use]
    pub fn with_large_threshold(mut self, threshold: u32) -> Self {
        self.large_threshold = threshold;
        self
    }

    /// Set client log verbosity
    #[must_use]
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Do not connect until [`connect`](crate::GatewayClient::connect) is called
    #[must_use]
    pub fn manual_connect(mut self) -> Self {
        self.auto_connect = false;
        self
    }

    /// Override the REST base used for gateway discovery
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Use a fixed gateway address instead of discovery
    #[must_use]
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = Some(url.into());
        self
    }

    /// Set the session state file path
    #[must_use]
    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = path.into();
        self
    }

    /// The shard index persisted state is keyed by, when sharding is in use
    #[must_use]
    pub fn shard_index(&self) -> Option<u32> {
        self.shard.map(|[index, _]| index)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.is_empty() {
            return Err(ConfigError::MissingToken);
        }

        if let Some([index, total]) = self.shard {
            if total == 0 || index >= total {
                return Err(ConfigError::InvalidShard { index, total });
            }
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("credential token must not be empty")]
    MissingToken,

    #[error("shard index {index} is out of range for {total} shard(s)")]
    InvalidShard { index: u32, total: u32 },
}
