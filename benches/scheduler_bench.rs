//! Benchmark: Scheduling Overhead
//!
//! Measures engine overhead with the built-in task bodies (no model calls):
//! cache key derivation, cache lookups and full workflow runs.
//!
//! Run: cargo bench --bench scheduler_bench

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use duckflow::cache::{CacheKey, CacheStore};
use duckflow::{builtin, ChatInput, ChatMessage, Engine, EngineConfig};
use serde_json::json;

fn engine() -> Engine {
    let mut config = EngineConfig::default();
    config.engine.warmup = false;
    Engine::builder(builtin::registry())
        .config(config)
        .definitions(builtin::definitions().unwrap())
        .build()
        .unwrap()
}

/// Benchmark cache key derivation with growing context windows
fn bench_cache_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_key");

    for context in [0usize, 3, 6] {
        let recent = (0..context)
            .map(|i| ChatMessage::user(format!("earlier message number {i}")))
            .collect();
        let input = ChatInput::text("I am a little worried about tomorrow's exam").with_recent(recent);

        group.bench_with_input(BenchmarkId::new("derive", context), &input, |b, input| {
            b.iter(|| CacheKey::derive(black_box("emotion"), black_box(input), 3));
        });
    }

    group.finish();
}

/// Benchmark cache hits and misses
fn bench_cache_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_store");
    let cache = CacheStore::new(1000);
    for i in 0..1000u64 {
        cache
            .put(CacheKey::from_raw(i), Arc::new(json!({"i": i})), Duration::from_secs(600))
            .unwrap();
    }

    group.throughput(Throughput::Elements(1));
    group.bench_function("get_hit", |b| {
        b.iter(|| cache.get(black_box(&CacheKey::from_raw(500))).unwrap());
    });
    group.bench_function("get_miss", |b| {
        b.iter(|| cache.get(black_box(&CacheKey::from_raw(5000))).unwrap());
    });
    group.bench_function("put_evict", |b| {
        let mut i = 10_000u64;
        b.iter(|| {
            cache
                .put(CacheKey::from_raw(i), Arc::new(json!(i)), Duration::from_secs(600))
                .unwrap();
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark full runs: cold (unique text) versus warm (cached text)
fn bench_workflow_runs(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = engine();
    let mut group = c.benchmark_group("workflow_run");

    for workflow in ["basic_chat_flow", "enhanced_chat_flow"] {
        group.bench_with_input(BenchmarkId::new("warm", workflow), &workflow, |b, wf| {
            b.to_async(&rt).iter(|| {
                let (engine, wf) = (&engine, *wf);
                async move {
                    engine
                        .execute(wf, "bench", ChatInput::text("so happy today"))
                        .await
                        .unwrap()
                }
            });
        });

        let mut n = 0u64;
        group.bench_with_input(BenchmarkId::new("cold", workflow), &workflow, |b, wf| {
            b.to_async(&rt).iter(|| {
                n += 1;
                let text = format!("message {n}");
                let (engine, wf) = (&engine, *wf);
                async move {
                    engine
                        .execute(wf, "bench", ChatInput::text(text))
                        .await
                        .unwrap()
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_cache_key, bench_cache_store, bench_workflow_runs);
criterion_main!(benches);
