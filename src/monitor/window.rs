//! Rolling window of completed runs
//!
//! Fixed capacity; once full, every new record overwrites the oldest.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

/// One completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub workflow: Arc<str>,
    #[serde(rename = "total_ms", serialize_with = "as_millis")]
    pub total: Duration,
    /// True only if every cacheable task of the run was served from cache
    pub cache_hit: bool,
    pub success: bool,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Latency summary over the window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
    pub sample_count: usize,
}

/// Ring buffer of the last `capacity` runs
#[derive(Debug, Clone)]
pub struct PerformanceWindow {
    records: VecDeque<RunRecord>,
    capacity: usize,
    /// Records overwritten since creation
    overwritten: u64,
}

impl PerformanceWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            overwritten: 0,
        }
    }

    pub fn push(&mut self, record: RunRecord) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
            self.overwritten += 1;
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &RunRecord> {
        self.records.iter()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Share of runs where every cacheable task hit the cache
    pub fn cache_hit_rate(&self) -> f64 {
        self.rate(|r| r.cache_hit)
    }

    pub fn success_rate(&self) -> f64 {
        self.rate(|r| r.success)
    }

    fn rate(&self, pred: impl Fn(&RunRecord) -> bool) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let hits = self.records.iter().filter(|r| pred(r)).count();
        hits as f64 / self.records.len() as f64
    }

    pub fn latency(&self) -> LatencyStats {
        let mut sorted: Vec<u64> = self
            .records
            .iter()
            .map(|r| r.total.as_micros() as u64)
            .collect();
        if sorted.is_empty() {
            return LatencyStats::default();
        }
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let ms = |micros: u64| micros as f64 / 1000.0;

        LatencyStats {
            avg_ms: ms(sum) / count as f64,
            p50_ms: ms(sorted[count * 50 / 100]),
            p95_ms: ms(sorted[(count * 95 / 100).min(count - 1)]),
            max_ms: ms(sorted[count - 1]),
            sample_count: count,
        }
    }
}
