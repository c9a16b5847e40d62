//! EventSink - 호스트 이벤트 큐의 쓰기 핸들
//!
//! The host hands a sink to every producer when the pipeline starts. Every
//! event passes through [`Event::normalize`] before it is queued, so the
//! consumer on the other end only ever sees well-formed events.

use crate::{Event, PluginError, Result};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// Write end of the host's bounded event queue
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<Event>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Create a bounded queue and return its sink and receiver
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Validate and enqueue an event
    ///
    /// Suspends while the queue is full. Invalid events are rejected with
    /// `InvalidArgument` and never reach the queue.
    pub async fn emit(&self, event: Event) -> Result<()> {
        let event = event.normalize()?;
        debug!(
            event_type = %event.event_type,
            source = %event.source,
            "Queueing event"
        );
        self.tx
            .send(event)
            .await
            .map_err(|_| PluginError::internal("event queue is closed"))
    }

    /// Enqueue an event given as loosely-typed JSON
    pub async fn emit_json(&self, value: Value) -> Result<()> {
        let event = Event::from_json(value)?;
        self.emit(event).await
    }

    /// Enqueue without waiting; fails if the queue is full
    pub fn try_emit(&self, event: Event) -> Result<()> {
        let event = event.normalize()?;
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PluginError::internal("event queue is full"),
            mpsc::error::TrySendError::Closed(_) => {
                PluginError::internal("event queue is closed")
            }
        })
    }

    /// Whether the consumer side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Number of events currently buffered
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let (sink, mut rx) = EventSink::channel(4);
        sink.emit(Event::new("task.created", "tasks").with_session("s"))
            .await
            .unwrap();

        assert_eq!(sink.queued(), 1);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, "task.created");
        assert_eq!(sink.queued(), 0);
    }

    #[tokio::test]
    async fn test_invalid_event_never_queued() {
        let (sink, mut rx) = EventSink::channel(4);
        let result = sink.emit(Event::new("", "tasks").with_session("s")).await;

        assert!(matches!(result, Err(PluginError::InvalidArgument(_))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_emit_json_and_full_queue() {
        let (sink, _rx) = EventSink::channel(1);
        sink.emit_json(json!({
            "type": "chat.started",
            "source": "hooks",
            "metadata": {"session_id": "x"}
        }))
        .await
        .unwrap();

        let second = Event::new("chat.ended", "hooks").with_session("x");
        assert!(sink.try_emit(second).is_err());
    }

    #[test]
    fn test_backpressure_blocks_until_dequeued() {
        let (sink, mut rx) = EventSink::channel(1);
        sink.try_emit(Event::new("a.b", "src").with_session("s")).unwrap();

        let mut pending =
            tokio_test::task::spawn(sink.emit(Event::new("a.c", "src").with_session("s")));
        tokio_test::assert_pending!(pending.poll());

        assert_eq!(rx.try_recv().unwrap().event_type, "a.b");
        assert!(pending.is_woken());
        tokio_test::assert_ready_ok!(pending.poll());
        assert_eq!(rx.try_recv().unwrap().event_type, "a.c");
    }

    #[tokio::test]
    async fn test_closed_queue() {
        let (sink, rx) = EventSink::channel(1);
        drop(rx);
        assert!(sink.is_closed());
        let result = sink
            .emit(Event::new("a.b", "src").with_session("s"))
            .await;
        assert!(matches!(result, Err(PluginError::Internal(_))));
    }
}
