//! Cache Module - content-addressed task output cache
//!
//! Key types:
//! - `CacheKey`: xxh3 hash of task name, normalized input and recent context
//! - `CacheStore`: TTL-bounded store capped at a maximum entry count
//! - `CacheEntry`: Cached value with provenance and expiry
//!
//! The cache is advisory: when it is offline every operation returns
//! `CacheUnavailable` and callers fall through to a real invocation.

mod key;
mod store;

pub use key::{normalize_text, CacheKey};
pub use store::{spawn_sweeper, CacheEntry, CacheStats, CacheStore};
