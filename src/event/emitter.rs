//! EventEmitter Trait - abstraction for event emission
//!
//! The scheduler emits through this trait: `EventLog` for synchronous runs,
//! `StreamEmitter` for streamed runs.

use super::log::{EventKind, EventLog};

/// Trait for emitting events during workflow execution
pub trait EventEmitter: Send + Sync {
    /// Emit an event and return its ID
    fn emit(&self, kind: EventKind) -> u64;
}

impl EventEmitter for EventLog {
    fn emit(&self, kind: EventKind) -> u64 {
        EventLog::emit(self, kind)
    }
}
