//! Transport-level stream decompression framer
//!
//! The gateway compresses its outbound traffic as one continuous zlib stream
//! per connection. Messages arrive as binary frames that may slice that stream
//! anywhere, and each complete message is terminated by a sync-flush marker.
//! This module reassembles those frames into whole, parsed JSON messages in
//! strict receive order.

use flate2::{Decompress, FlushDecompress};
use serde_json::Value;
use tokio::sync::Mutex;

/// Suffix a sync flush leaves on every complete compressed frame
const SYNC_FLUSH_MARKER: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// Initial frame buffer capacity
const FRAME_BUFFER_CAPACITY: usize = 32 * 1024;

/// Granularity of decompressed output growth
const OUTPUT_CHUNK: usize = 64 * 1024;

/// Errors from the inflate stream
///
/// Both variants are unrecoverable for the connection; "need more data" is
/// signalled by `Ok(None)` from [`InflateStream::push`], never by an error.
#[derive(Debug, thiserror::Error)]
pub enum InflateError {
    /// The shared decompression context rejected a frame and can no longer be trusted
    #[error("decompression failed: {0}")]
    Corrupted(#[from] flate2::DecompressError),

    /// A previous frame already corrupted the context
    #[error("inflate stream poisoned by an earlier failure")]
    Poisoned,
}

/// Stream decompressor for one gateway connection
///
/// Owns a single decompression context whose internal back-references span
/// message boundaries. A new instance must be created per connection and must
/// never be shared across connections.
///
/// `push` calls are serialized FIFO over the context: the write+flush of one
/// terminated frame fully completes (including its success-or-error outcome)
/// before the next call's write begins, even when callers do not await each
/// push before issuing the next.
pub struct InflateStream {
    inner: Mutex<Inner>,
}

struct Inner {
    ctx: Decompress,
    /// Bytes of the current not-yet-terminated frame
    buffer: Vec<u8>,
    /// Decompressed output accumulated toward the next complete message
    output: Vec<u8>,
    poisoned: bool,
}

impl InflateStream {
    /// Create a fresh stream with a new decompression context
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                ctx: Decompress::new(true),
                buffer: Vec::with_capacity(FRAME_BUFFER_CAPACITY),
                output: Vec::with_capacity(OUTPUT_CHUNK),
                poisoned: false,
            }),
        }
    }

    /// Feed one binary frame from the transport
    ///
    /// Returns `Ok(Some(message))` when the frame completed a message,
    /// `Ok(None)` when more data is needed, and `Err` when the shared context
    /// is corrupted and the connection must be dropped.
    pub async fn push(&self, frame: &[u8]) -> Result<Option<Value>, InflateError> {
        let mut inner = self.inner.lock().await;

        if inner.poisoned {
            return Err(InflateError::Poisoned);
        }

        inner.buffer.extend_from_slice(frame);

        if !inner.frame_terminated() {
            // Partial frame; no decompression attempt until the marker arrives.
            return Ok(None);
        }

        let compressed = std::mem::take(&mut inner.buffer);
        if let Err(e) = inner.inflate(&compressed) {
            inner.poisoned = true;
            tracing::error!(error = %e, "inflate context corrupted");
            return Err(e.into());
        }

        // The context may hand the message back across several internal
        // chunks with no end-of-message signal. A message is complete only
        // once the output ends in a closing brace and parses as JSON.
        if inner.output.last() != Some(&b'}') {
            return Ok(None);
        }

        match serde_json::from_slice::<Value>(&inner.output) {
            Ok(message) => {
                inner.output.clear();
                Ok(Some(message))
            }
            Err(_) => Ok(None),
        }
    }
}

impl Inner {
    fn frame_terminated(&self) -> bool {
        self.buffer.len() >= SYNC_FLUSH_MARKER.len()
            && self.buffer[self.buffer.len() - SYNC_FLUSH_MARKER.len()..] == SYNC_FLUSH_MARKER
    }

    /// Run one complete compressed frame through the persistent context
    fn inflate(&mut self, compressed: &[u8]) -> Result<(), flate2::DecompressError> {
        let mut consumed = 0usize;
        loop {
            if self.output.len() == self.output.capacity() {
                self.output.reserve(OUTPUT_CHUNK);
            }

            let in_before = self.ctx.total_in();
            self.ctx
                .decompress_vec(&compressed[consumed..], &mut self.output, FlushDecompress::Sync)?;
            consumed += usize::try_from(self.ctx.total_in() - in_before).unwrap_or(usize::MAX);

            // Done once all input is consumed and the context had spare
            // output room (nothing left buffered internally).
            if consumed >= compressed.len() && self.output.len() < self.output.capacity() {
                return Ok(());
            }
        }
    }
}

impl Default for InflateStream {
    fn default() -> Self {
        Self::new()
    }
}
