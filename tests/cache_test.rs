//! # Cache Tests
//!
//! TTL expiry, the size cap and the background sweeper.

use std::sync::Arc;
use std::time::Duration;

use duckflow::cache::{spawn_sweeper, CacheKey, CacheStore};
use duckflow::{ChatInput, ChatMessage};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn key(task: &str, text: &str) -> CacheKey {
    CacheKey::derive(task, &ChatInput::text(text), 3)
}

#[tokio::test]
async fn entries_expire_after_their_ttl() {
    let cache = CacheStore::new(100);
    cache
        .put(key("emotion", "hi"), Arc::new(json!("short")), Duration::from_millis(40))
        .unwrap();
    cache
        .put(key("recall", "hi"), Arc::new(json!("long")), Duration::from_secs(60))
        .unwrap();

    assert!(cache.get(&key("emotion", "hi")).unwrap().is_some());
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(cache.get(&key("emotion", "hi")).unwrap().is_none());
    assert_eq!(*cache.get(&key("recall", "hi")).unwrap().unwrap().value, json!("long"));
    assert_eq!(cache.len(), 1);
}

#[test]
fn size_never_exceeds_the_cap() {
    let cache = CacheStore::new(50);
    for i in 0..200 {
        cache
            .put(
                key("emotion", &format!("message {}", i)),
                Arc::new(json!(i)),
                Duration::from_secs(60),
            )
            .unwrap();
        assert!(cache.len() <= 50);
    }

    assert_eq!(cache.len(), 50);
    // Oldest entries were evicted first
    assert!(cache.get(&key("emotion", "message 0")).unwrap().is_none());
    assert!(cache.get(&key("emotion", "message 199")).unwrap().is_some());
}

#[test]
fn only_the_last_context_messages_count() {
    let recent = vec![
        ChatMessage::user("one"),
        ChatMessage::user("two"),
        ChatMessage::user("three"),
        ChatMessage::user("four"),
    ];
    let full = ChatInput::text("hi").with_recent(recent.clone());
    let trimmed = ChatInput::text("hi").with_recent(recent[1..].to_vec());

    assert_eq!(
        CacheKey::derive("emotion", &full, 3),
        CacheKey::derive("emotion", &trimmed, 3)
    );
    assert_ne!(
        CacheKey::derive("emotion", &full, 4),
        CacheKey::derive("emotion", &trimmed, 4)
    );
    assert_ne!(
        CacheKey::derive("emotion", &full, 3),
        CacheKey::derive("recall", &full, 3)
    );
}

#[tokio::test]
async fn sweeper_removes_expired_entries() {
    let cache = Arc::new(CacheStore::new(100));
    for i in 0..10 {
        cache
            .put(
                key("tips", &format!("m{}", i)),
                Arc::new(json!(i)),
                Duration::from_millis(20),
            )
            .unwrap();
    }

    let shutdown = CancellationToken::new();
    let handle = spawn_sweeper(Arc::clone(&cache), Duration::from_millis(30), shutdown.clone());
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(cache.is_empty());

    shutdown.cancel();
    handle.await.unwrap();
}

#[test]
fn unavailable_cache_reports_errors() {
    let cache = CacheStore::new(10);
    cache.set_available(false);
    assert!(cache.get(&key("emotion", "hi")).is_err());
    assert!(cache
        .put(key("emotion", "hi"), Arc::new(json!(1)), Duration::from_secs(1))
        .is_err());

    cache.set_available(true);
    assert!(cache.get(&key("emotion", "hi")).unwrap().is_none());
}
