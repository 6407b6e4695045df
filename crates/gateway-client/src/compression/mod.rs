//! Stream decompression for the compressed transport.

mod inflate;

pub use inflate::{InflateError, InflateStream};
