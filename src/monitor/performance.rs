//! Process-wide execution statistics
//!
//! Run-level figures come from the rolling [`PerformanceWindow`];
//! per-task figures are lifetime counters, including recovered failures.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;

use crate::config::MonitorConfig;
use crate::store::{FailureKind, TaskResult};

use super::window::{LatencyStats, PerformanceWindow, RunRecord};

#[derive(Default)]
struct TaskCounters {
    invocations: AtomicU64,
    successes: AtomicU64,
    cache_hits: AtomicU64,
    timeouts: AtomicU64,
    errors: AtomicU64,
    circuit_skips: AtomicU64,
    total_micros: AtomicU64,
}

impl TaskCounters {
    fn snapshot(&self) -> TaskStats {
        let invocations = self.invocations.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        let total_micros = self.total_micros.load(Ordering::Relaxed);
        let (avg_latency_ms, success_rate) = if invocations == 0 {
            (0.0, 0.0)
        } else {
            (
                total_micros as f64 / 1000.0 / invocations as f64,
                successes as f64 / invocations as f64,
            )
        };
        TaskStats {
            invocations,
            successes,
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            circuit_skips: self.circuit_skips.load(Ordering::Relaxed),
            avg_latency_ms,
            success_rate,
        }
    }
}

/// Per-task figures
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskStats {
    pub invocations: u64,
    pub successes: u64,
    pub cache_hits: u64,
    pub timeouts: u64,
    pub errors: u64,
    pub circuit_skips: u64,
    pub avg_latency_ms: f64,
    pub success_rate: f64,
}

/// Point-in-time view returned by `Engine::stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Runs currently in the window
    pub runs: usize,
    /// Runs recorded since start
    pub total_runs: u64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub cache_hit_rate: f64,
    pub success_rate: f64,
    pub per_task: BTreeMap<String, TaskStats>,
    pub uptime_secs: u64,
}

impl StatsSnapshot {
    /// Whether the rolling figures crossed the configured thresholds
    pub fn should_optimize(&self, config: &MonitorConfig) -> bool {
        self.runs > 0
            && (self.cache_hit_rate < config.min_cache_hit_rate
                || self.avg_latency_ms > config.max_avg_latency_ms)
    }
}

/// Rolling run statistics plus per-task counters
pub struct PerformanceMonitor {
    window: RwLock<PerformanceWindow>,
    tasks: DashMap<Arc<str>, TaskCounters>,
    total_runs: AtomicU64,
    start_time: Instant,
}

impl PerformanceMonitor {
    pub fn new(window: usize) -> Self {
        Self {
            window: RwLock::new(PerformanceWindow::new(window)),
            tasks: DashMap::new(),
            total_runs: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.window)
    }

    /// Record one finished run
    pub fn record_run(&self, workflow: Arc<str>, total: Duration, cache_hit: bool, success: bool) {
        self.total_runs.fetch_add(1, Ordering::Relaxed);
        self.window.write().push(RunRecord {
            workflow,
            total,
            cache_hit,
            success,
        });
    }

    /// Record one task result, fallbacks included
    pub fn record_task(&self, result: &TaskResult) {
        let counters = self
            .tasks
            .entry(Arc::clone(&result.task_name))
            .or_default();

        counters.invocations.fetch_add(1, Ordering::Relaxed);
        counters
            .total_micros
            .fetch_add(result.duration.as_micros() as u64, Ordering::Relaxed);
        if result.served_from_cache {
            counters.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        match result.failure_kind() {
            None => counters.successes.fetch_add(1, Ordering::Relaxed),
            Some(FailureKind::Timeout) => counters.timeouts.fetch_add(1, Ordering::Relaxed),
            Some(FailureKind::Error) => counters.errors.fetch_add(1, Ordering::Relaxed),
            Some(FailureKind::CircuitOpen) => {
                counters.circuit_skips.fetch_add(1, Ordering::Relaxed)
            }
        };
    }

    pub fn latency(&self) -> LatencyStats {
        self.window.read().latency()
    }

    /// Recompute every aggregate from the current window and counters
    pub fn snapshot(&self) -> StatsSnapshot {
        let (runs, latency, cache_hit_rate, success_rate) = {
            let window = self.window.read();
            (
                window.len(),
                window.latency(),
                window.cache_hit_rate(),
                window.success_rate(),
            )
        };

        let per_task = self
            .tasks
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().snapshot()))
            .collect();

        StatsSnapshot {
            runs,
            total_runs: self.total_runs.load(Ordering::Relaxed),
            avg_latency_ms: latency.avg_ms,
            p50_latency_ms: latency.p50_ms,
            p95_latency_ms: latency.p95_ms,
            cache_hit_rate,
            success_rate,
            per_task,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn should_optimize(&self, config: &MonitorConfig) -> bool {
        self.snapshot().should_optimize(config)
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let window = self.window.read();
        f.debug_struct("PerformanceMonitor")
            .field("runs", &window.len())
            .field("capacity", &window.capacity())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}
