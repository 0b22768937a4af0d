//! Event Module - ordered progress events for workflow runs
//!
//! Key types:
//! - `Event`: Envelope with id + elapsed time + kind
//! - `EventKind`: start / task_start / task_end / error / complete
//! - `EventLog`: Thread-safe, append-only log for synchronous runs
//! - `EventEmitter`: Trait the scheduler emits through
//! - `StreamEmitter` / `RunStream`: Cancellable single-consumer channel

mod emitter;
mod log;
mod stream;

pub use emitter::EventEmitter;
pub use log::{Event, EventKind, EventLog};
pub use stream::{RunStream, StreamEmitter};
