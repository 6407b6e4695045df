//! Event-category subscription bitmask
//!
//! The gateway only delivers dispatch events in the categories selected here.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// Subscribed-event-categories bitmask sent in Identify
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Intents: u16 {
        const GUILDS = 1 << 0;
        /// Privileged: member lists and member update events
        const GUILD_MEMBERS = 1 << 1;
        const GUILD_BANS = 1 << 2;
        const GUILD_EMOJIS_AND_STICKERS = 1 << 3;
        const GUILD_INTEGRATIONS = 1 << 4;
        const GUILD_WEBHOOKS = 1 << 5;
        const GUILD_INVITES = 1 << 6;
        const GUILD_VOICE_STATES = 1 << 7;
        /// Privileged: presence update events
        const GUILD_PRESENCES = 1 << 8;
        const GUILD_MESSAGES = 1 << 9;
        const GUILD_MESSAGE_REACTIONS = 1 << 10;
        const GUILD_MESSAGE_TYPING = 1 << 11;
        const DIRECT_MESSAGES = 1 << 12;
        const DIRECT_MESSAGE_REACTIONS = 1 << 13;
        const DIRECT_MESSAGE_TYPING = 1 << 14;
        const GUILD_SCHEDULED_EVENTS = 1 << 15;
    }
}

impl Intents {
    /// Every category that does not require privileged approval
    #[must_use]
    pub const fn unprivileged() -> Self {
        Self::all()
            .difference(Self::GUILD_MEMBERS)
            .difference(Self::GUILD_PRESENCES)
    }
}

impl Default for Intents {
    fn default() -> Self {
        Self::unprivileged()
    }
}

// The wire format is a plain integer, not bitflags' name list.
impl Serialize for Intents {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u16(self.bits())
    }
}

impl<'de> Deserialize<'de> for Intents {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = u16::deserialize(deserializer)?;
        Ok(Self::from_bits_truncate(bits))
    }
}
