//! Large-collection pagination reassembly
//!
//! A "large" creation event arrives without its member list; the members
//! follow in one or more chunk dispatches. This cache buffers the creation
//! event per collection id, absorbs chunks, and releases a single merged
//! event once the member list is complete. Entries are removed the moment
//! they merge, so the map never outlives its pending work.

use serde_json::Value;
use std::collections::HashMap;

/// A buffered creation event awaiting its member chunks
#[derive(Debug)]
struct PendingGuild {
    event_type: String,
    payload: Value,
    members: Vec<Value>,
    /// Declared total member count, when the creation payload carried one
    expected: Option<u64>,
}

impl PendingGuild {
    fn is_complete(&self, chunk: &Value) -> bool {
        if let Some(expected) = self.expected {
            if (self.members.len() as u64) >= expected {
                return true;
            }
            // A chunk that marks itself final wins even when the declared
            // count was off.
            if let (Some(index), Some(count)) = (chunk["chunk_index"].as_u64(), chunk["chunk_count"].as_u64()) {
                return index + 1 >= count;
            }
            false
        } else {
            // No declared count: the first chunk completes the collection.
            true
        }
    }
}

/// Pending large-collection cache, keyed by collection id
///
/// At most one entry per id; a second creation event for the same id
/// overwrites the pending one (last write wins, not an error).
#[derive(Debug, Default)]
pub struct PendingGuilds {
    entries: HashMap<String, PendingGuild>,
}

impl PendingGuilds {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a large creation event under its collection id
    pub fn insert(&mut self, guild_id: impl Into<String>, event_type: impl Into<String>, payload: Value) {
        let guild_id = guild_id.into();
        let expected = payload["member_count"].as_u64();

        let previous = self.entries.insert(
            guild_id.clone(),
            PendingGuild {
                event_type: event_type.into(),
                payload,
                members: Vec::new(),
                expected,
            },
        );

        if previous.is_some() {
            tracing::debug!(guild_id = %guild_id, "replaced pending creation event");
        }
    }

    /// Whether a creation event is buffered for this id
    #[must_use]
    pub fn contains(&self, guild_id: &str) -> bool {
        self.entries.contains_key(guild_id)
    }

    /// Number of pending entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Absorb one members chunk
    ///
    /// Returns the merged `(event_type, payload)` once the member list is
    /// complete, removing the entry; `None` while more chunks are expected
    /// or when nothing is buffered for this id.
    pub fn absorb_chunk(&mut self, guild_id: &str, chunk: &Value) -> Option<(String, Value)> {
        let pending = self.entries.get_mut(guild_id)?;

        if let Some(members) = chunk["members"].as_array() {
            pending.members.extend(members.iter().cloned());
        }

        if !pending.is_complete(chunk) {
            return None;
        }

        let mut done = self.entries.remove(guild_id)?;
        done.payload["members"] = Value::Array(std::mem::take(&mut done.members));
        Some((done.event_type, done.payload))
    }
}
