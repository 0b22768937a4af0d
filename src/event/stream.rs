//! Streamed run events
//!
//! `StreamEmitter` forwards events of one run into an unbounded channel;
//! `RunStream` is the consumer half.
//!
//! Cancellation stops delivery, not computation. Once the run's token is
//! cancelled (by the caller, by dropping the `RunStream`, or because the
//! consumer went away), the next emitted event is replaced by a single
//! `run_cancelled` error and the channel closes. Tasks that were already
//! running finish in the background and still write their results to the
//! cache; tasks that had not started are skipped.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::emitter::EventEmitter;
use super::log::{Event, EventKind};

struct StreamState {
    tx: Option<mpsc::UnboundedSender<Event>>,
    next_id: u64,
}

/// Producer half bound to one run
pub struct StreamEmitter {
    state: Mutex<StreamState>,
    workflow: Arc<str>,
    start_time: Instant,
    cancel: CancellationToken,
}

impl StreamEmitter {
    /// Create a connected emitter/stream pair
    pub fn channel(
        workflow: Arc<str>,
        correlation_id: Arc<str>,
        start_time: Instant,
        cancel: CancellationToken,
    ) -> (Self, RunStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = Self {
            state: Mutex::new(StreamState {
                tx: Some(tx),
                next_id: 0,
            }),
            workflow,
            start_time,
            cancel: cancel.clone(),
        };
        let stream = RunStream {
            inner: UnboundedReceiverStream::new(rx),
            cancel,
            correlation_id,
        };
        (emitter, stream)
    }

    /// Whether events are still being delivered
    pub fn is_open(&self) -> bool {
        self.state.lock().tx.is_some()
    }

    /// Stop delivery without a cancellation notice
    pub fn close(&self) {
        self.state.lock().tx = None;
    }
}

impl EventEmitter for StreamEmitter {
    fn emit(&self, kind: EventKind) -> u64 {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let id = state.next_id;
        let Some(tx) = state.tx.as_ref() else {
            return id;
        };

        let (kind, closing) = if self.cancel.is_cancelled() {
            (EventKind::run_cancelled(&self.workflow), true)
        } else {
            let closing = matches!(kind, EventKind::Complete { .. });
            (kind, closing)
        };

        let event = Event {
            id,
            elapsed_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };
        state.next_id += 1;

        if tx.send(event).is_err() {
            debug!(workflow = %self.workflow, "stream consumer disconnected");
            state.tx = None;
            self.cancel.cancel();
        } else if closing {
            state.tx = None;
        }
        id
    }
}

/// Consumer half: an ordered, cancellable stream of run events
///
/// Dropping it cancels the run.
pub struct RunStream {
    inner: UnboundedReceiverStream<Event>,
    cancel: CancellationToken,
    correlation_id: Arc<str>,
}

impl RunStream {
    /// Cancel the run; a final `run_cancelled` event follows
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Drain every remaining event
    pub async fn collect_events(mut self) -> Vec<Event> {
        use futures::StreamExt;

        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}

impl Stream for RunStream {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

impl Drop for RunStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    fn pair() -> (StreamEmitter, RunStream, CancellationToken) {
        let cancel = CancellationToken::new();
        let (emitter, stream) = StreamEmitter::channel(
            Arc::from("basic_chat_flow"),
            Arc::from("corr-1"),
            Instant::now(),
            cancel.clone(),
        );
        (emitter, stream, cancel)
    }

    fn task_start(name: &str) -> EventKind {
        EventKind::TaskStart {
            task_name: Arc::from(name),
            level: 0,
        }
    }

    #[tokio::test]
    async fn events_arrive_in_order_and_close_after_complete() {
        let (emitter, stream, _cancel) = pair();
        emitter.emit(task_start("emotion"));
        emitter.emit(task_start("style"));
        emitter.emit(EventKind::Complete {
            status: crate::runtime::RunStatus::Completed,
            total_duration_ms: 1,
            output: Arc::new(json!("ok")),
        });
        emitter.emit(task_start("late"));

        assert!(!emitter.is_open());
        let events = stream.collect_events().await;
        let phases: Vec<_> = events.iter().map(|e| e.kind.phase()).collect();
        assert_eq!(phases, vec!["task_start", "task_start", "complete"]);
        assert_eq!(events.iter().map(|e| e.id).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn cancel_delivers_single_notice() {
        let (emitter, mut stream, _cancel) = pair();
        emitter.emit(task_start("emotion"));
        stream.cancel();
        emitter.emit(task_start("recall"));
        emitter.emit(task_start("tips"));

        let first = stream.next().await.unwrap();
        assert_eq!(first.kind.phase(), "task_start");
        let second = stream.next().await.unwrap();
        assert!(second.kind.is_run_cancelled());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn dropped_consumer_cancels_run() {
        let (emitter, stream, cancel) = pair();
        drop(stream);
        assert!(cancel.is_cancelled());

        emitter.emit(task_start("emotion"));
        assert!(!emitter.is_open());
    }

    #[test]
    fn correlation_id_is_exposed() {
        let (_emitter, stream, _cancel) = pair();
        assert_eq!(stream.correlation_id(), "corr-1");
        assert!(!stream.is_cancelled());
    }
}
