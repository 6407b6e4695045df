//! Session resume state and its on-disk store.

mod store;

pub use store::{SessionRecord, SessionStore};
