//! Execution statistics
//!
//! - [`window`]: `PerformanceWindow` ring buffer of completed runs
//! - [`performance`]: `PerformanceMonitor` and its `StatsSnapshot`

pub mod performance;
pub mod window;

pub use performance::{PerformanceMonitor, StatsSnapshot, TaskStats};
pub use window::{LatencyStats, PerformanceWindow, RunRecord};
