//! Persisted session state
//!
//! One JSON record at a fixed path keeps `{session, seq, disconnectTime}`
//! between processes so a restart can resume instead of re-identifying.
//! When sharding is in use the file holds one slot per shard index, and
//! writes are read-modify-write so shards do not clobber each other.
//! Persistence is best effort throughout: a missing or malformed file is
//! empty state, and exhausted retries degrade to a fresh identify.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

const READ_ATTEMPTS: u32 = 4;
const WRITE_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// One persisted session record (per shard, or global when unsharded)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionRecord {
    /// Opaque session id assigned by the gateway
    pub session: Option<String>,

    /// Last observed dispatch sequence number
    pub seq: Option<u64>,

    /// Unix milliseconds of the last disconnect
    pub disconnect_time: Option<i64>,
}

impl SessionRecord {
    /// Whether this record can drive a Resume request
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        self.session.is_some() && self.seq.is_some()
    }
}

/// On-disk layout: global fields, plus an optional per-shard slot array
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StateFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    shard: Option<Vec<Option<SessionRecord>>>,

    #[serde(flatten)]
    global: SessionRecord,
}

/// File-backed store for session resume state
pub struct SessionStore {
    path: PathBuf,
    shard: Option<u32>,
}

impl SessionStore {
    /// Create a store at `path`, scoped to `shard` when sharding is in use
    #[must_use]
    pub fn new(path: impl AsRef<Path>, shard: Option<u32>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            shard,
        }
    }

    /// Load this shard's (or the global) record
    ///
    /// Missing and malformed files are both empty state, never an error.
    pub async fn load(&self) -> SessionRecord {
        let state = self.read_state().await;

        match self.shard {
            Some(index) => state
                .shard
                .and_then(|slots| slots.into_iter().nth(index as usize).flatten())
                .unwrap_or_default(),
            None => state.global,
        }
    }

    /// Persist `record` into this shard's slot, keeping other slots intact
    ///
    /// Failures are logged and swallowed; losing resume capability only
    /// costs a fresh identify on the next connection.
    pub async fn save(&self, record: &SessionRecord) {
        let policy = RetryPolicy::new(RETRY_DELAY, WRITE_ATTEMPTS);
        let result = policy.run(|| self.write_once(record)).await;

        if let Err(e) = result {
            tracing::error!(path = %self.path.display(), error = %e, "giving up saving session state");
        }
    }

    async fn write_once(&self, record: &SessionRecord) -> std::io::Result<()> {
        let mut state = self.read_state().await;

        match self.shard {
            Some(index) => {
                let slots = state.shard.get_or_insert_with(Vec::new);
                let index = index as usize;
                if slots.len() <= index {
                    slots.resize(index + 1, None);
                }
                slots[index] = Some(record.clone());
            }
            None => state.global = record.clone(),
        }

        let json = serde_json::to_vec(&state)?;
        fs::write(&self.path, json).await
    }

    /// Read the whole state file, retrying transient I/O errors
    async fn read_state(&self) -> StateFile {
        let policy = RetryPolicy::new(RETRY_DELAY, READ_ATTEMPTS);
        let bytes = policy
            .run(|| async move {
                match fs::read(&self.path).await {
                    Ok(bytes) => Ok(Some(bytes)),
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await;

        match bytes {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %self.path.display(), error = %e, "malformed session state, starting empty");
                StateFile::default()
            }),
            Ok(None) => {
                tracing::debug!(path = %self.path.display(), "no previous session state");
                StateFile::default()
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "unreadable session state, starting empty");
                StateFile::default()
            }
        }
    }
}
