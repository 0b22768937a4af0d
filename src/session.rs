//! Session store - recent message windows per chat session
//!
//! The engine reads a session's window when a request carries no explicit
//! context and clears it on `invalidate_session`. Appending messages after a
//! reply is the caller's job.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One message of conversation context
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Injected collaborator holding per-session conversation windows
pub trait SessionStore: Send + Sync {
    /// Up to `limit` most recent messages, oldest first
    fn recent(&self, session_id: &str, limit: usize) -> Vec<ChatMessage>;

    fn append(&self, session_id: &str, message: ChatMessage);

    /// Drop the session; returns whether it existed
    fn clear(&self, session_id: &str) -> bool;
}

/// DashMap-backed store keeping a bounded window per session
pub struct InMemorySessionStore {
    sessions: DashMap<Arc<str>, VecDeque<ChatMessage>>,
    capacity: usize,
}

impl InMemorySessionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            capacity,
        }
    }

    /// Known session ids, sorted
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().to_string()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(6)
    }
}

impl SessionStore for InMemorySessionStore {
    fn recent(&self, session_id: &str, limit: usize) -> Vec<ChatMessage> {
        self.sessions
            .get(session_id)
            .map(|window| {
                let skip = window.len().saturating_sub(limit);
                window.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    fn append(&self, session_id: &str, message: ChatMessage) {
        let mut window = self.sessions.entry(Arc::from(session_id)).or_default();
        window.push_back(message);
        while window.len() > self.capacity {
            window.pop_front();
        }
    }

    fn clear(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn window_is_capped_oldest_first() {
        let store = InMemorySessionStore::new(3);
        for i in 0..5 {
            store.append("s1", ChatMessage::user(format!("m{i}")));
        }

        let recent = store.recent("s1", 10);
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn recent_respects_limit() {
        let store = InMemorySessionStore::new(6);
        store.append("s1", ChatMessage::user("hi"));
        store.append("s1", ChatMessage::assistant("quack"));
        store.append("s1", ChatMessage::user("bye"));

        assert_eq!(
            store.recent("s1", 2),
            vec![ChatMessage::assistant("quack"), ChatMessage::user("bye")]
        );
        assert!(store.recent("unknown", 3).is_empty());
    }

    #[test]
    fn clear_removes_session() {
        let store = InMemorySessionStore::default();
        store.append("a", ChatMessage::user("x"));
        store.append("b", ChatMessage::user("y"));
        assert_eq!(store.session_ids(), vec!["a", "b"]);

        assert!(store.clear("a"));
        assert!(!store.clear("a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }
}
