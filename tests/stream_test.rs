//! # Stream Tests
//!
//! Event ordering and cancellation of streamed runs.

use std::collections::HashMap;
use std::time::Duration;

use duckflow::{builtin, ChatInput, Engine, EngineConfig, EventKind};
use futures::StreamExt;

fn engine() -> Engine {
    let mut config = EngineConfig::default();
    config.engine.warmup = false;
    Engine::builder(builtin::registry())
        .config(config)
        .definitions(builtin::definitions().unwrap())
        .build()
        .unwrap()
}

#[tokio::test]
async fn events_respect_dependency_order() {
    let engine = engine();
    let stream = engine
        .execute_stream("enhanced_chat_flow", "s1", ChatInput::text("I am so stressed"))
        .unwrap();
    let correlation_id = stream.correlation_id().to_string();
    let events = stream.collect_events().await;

    // start, 4 x (task_start, task_end), complete
    assert_eq!(events.len(), 10);
    let ids: Vec<u64> = events.iter().map(|e| e.id).collect();
    assert_eq!(ids, (0..10).collect::<Vec<_>>());
    assert!(events.windows(2).all(|w| w[0].elapsed_ms <= w[1].elapsed_ms));

    match &events[0].kind {
        EventKind::Start {
            correlation_id: id,
            task_count,
            ..
        } => {
            assert_eq!(id.as_ref(), correlation_id);
            assert_eq!(*task_count, 4);
        }
        other => panic!("expected start, got {:?}", other),
    }
    assert_eq!(events[9].kind.phase(), "complete");

    let position = |phase: &str, task: &str| {
        events
            .iter()
            .position(|e| e.kind.phase() == phase && e.kind.task_name() == Some(task))
            .unwrap()
    };
    for task in ["emotion", "recall", "tips", "style"] {
        assert!(position("task_start", task) < position("task_end", task));
    }
    assert!(position("task_end", "emotion") < position("task_start", "recall"));
    assert!(position("task_end", "emotion") < position("task_start", "tips"));
    assert!(position("task_end", "recall") < position("task_start", "style"));
    assert!(position("task_end", "tips") < position("task_start", "style"));

    let levels: HashMap<&str, usize> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::TaskStart { task_name, level } => Some((task_name.as_ref(), *level)),
            _ => None,
        })
        .collect();
    assert_eq!(levels["emotion"], 0);
    assert_eq!(levels["recall"], 1);
    assert_eq!(levels["tips"], 1);
    assert_eq!(levels["style"], 2);
}

#[tokio::test]
async fn events_serialize_flat() {
    let engine = engine();
    let events = engine
        .execute_stream("basic_chat_flow", "s1", ChatInput::text("hello"))
        .unwrap()
        .collect_events()
        .await;

    let first = serde_json::to_value(&events[0]).unwrap();
    assert_eq!(first["phase"], "start");
    assert_eq!(first["workflow"], "basic_chat_flow");
    assert_eq!(first["id"], 0);

    let last = serde_json::to_value(events.last().unwrap()).unwrap();
    assert_eq!(last["phase"], "complete");
    assert_eq!(last["status"], "completed");
    assert!(last["output"]["reply"].is_string());
}

#[tokio::test]
async fn cancel_before_first_task_yields_one_notice() {
    let engine = engine();
    let mut stream = engine
        .execute_stream("basic_chat_flow", "s1", ChatInput::text("hello"))
        .unwrap();
    stream.cancel();

    let mut notices = 0;
    while let Some(event) = stream.next().await {
        if event.kind.is_run_cancelled() {
            notices += 1;
        } else {
            assert_eq!(event.kind.phase(), "start");
        }
    }
    assert_eq!(notices, 1);
    assert_eq!(engine.stats().total_runs, 0);
}

#[tokio::test]
async fn dropping_the_stream_cancels_the_run() {
    let engine = engine();
    let stream = engine
        .execute_stream("enhanced_chat_flow", "s1", ChatInput::text("hello"))
        .unwrap();
    drop(stream);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.stats().total_runs, 0);
}
