//! Cache key derivation
//!
//! `xxh3_64` over (task name, normalized input, last N context messages).
//! Fields are joined with a unit separator so `("ab", "c")` and `("a", "bc")`
//! hash differently. The payload is serialized with serde_json's sorted map
//! so key order in the request never changes the hash.

use std::fmt;

use xxhash_rust::xxh3::xxh3_64;

use crate::runtime::ChatInput;

const SEP: char = '\u{1f}';

/// Content hash identifying one cacheable task invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(u64);

impl CacheKey {
    /// Derive the key for `task` given the run input.
    ///
    /// Only the last `context_messages` messages of the recent window count.
    pub fn derive(task: &str, input: &ChatInput, context_messages: usize) -> Self {
        let mut buf = String::with_capacity(64 + input.text.len());
        buf.push_str(task);
        buf.push(SEP);
        buf.push_str(&normalize_text(&input.text));
        buf.push(SEP);
        if !input.payload.is_null() {
            buf.push_str(&input.payload.to_string());
        }

        let skip = input.recent.len().saturating_sub(context_messages);
        for message in input.recent.iter().skip(skip) {
            buf.push(SEP);
            buf.push_str(message.role.as_str());
            buf.push(':');
            buf.push_str(&normalize_text(&message.content));
        }

        Self(xxh3_64(buf.as_bytes()))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xxh3:{:016x}", self.0)
    }
}

/// Trim, collapse whitespace runs, lowercase
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}
