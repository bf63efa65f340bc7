//! Stream sinks.
//!
//! A sink receives wire events; transports (SSE, WebSocket, in-process
//! consumers) implement it out of tree. Sinks that need buffering buffer
//! internally: the subscriber sends synchronously and propagates sink
//! errors into the run.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use arbor_domain::stream::StreamEvent;
use arbor_domain::{Error, Result};

#[async_trait]
pub trait Sink: Send + Sync {
    async fn send(&self, event: StreamEvent) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// Channel-backed sink: the receiver half feeds an SSE writer or any
/// other consumer.
pub struct ChannelSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Sink for ChannelSink {
    async fn send(&self, event: StreamEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| Error::execution("stream receiver dropped").with_code("sink_closed"))
    }

    async fn close(&self) -> Result<()> {
        // Dropping the sender closes the channel; nothing to flush.
        Ok(())
    }
}

/// Test/introspection sink that collects every event.
#[derive(Default)]
pub struct CollectorSink {
    events: Mutex<Vec<StreamEvent>>,
    closed: AtomicBool,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Sink for CollectorSink {
    async fn send(&self, event: StreamEvent) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_domain::stream::{AssistantReplyPayload, StreamEventKind, StreamPayload};

    fn reply(text: &str) -> StreamEvent {
        StreamEvent::new(
            StreamEventKind::AssistantReply,
            "run_1",
            "sess_1",
            StreamPayload::AssistantReply(AssistantReplyPayload { text: text.into() }),
        )
    }

    #[tokio::test]
    async fn channel_sink_delivers_to_receiver() {
        let (sink, mut rx) = ChannelSink::new(8);
        sink.send(reply("hi")).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, StreamEventKind::AssistantReply);
    }

    #[tokio::test]
    async fn channel_sink_errors_when_receiver_gone() {
        let (sink, rx) = ChannelSink::new(8);
        drop(rx);
        let err = sink.send(reply("hi")).await.unwrap_err();
        assert_eq!(err.code, "sink_closed");
    }

    #[tokio::test]
    async fn collector_sink_records_and_closes() {
        let sink = CollectorSink::new();
        sink.send(reply("a")).await.unwrap();
        sink.send(reply("b")).await.unwrap();
        assert_eq!(sink.events().len(), 2);
        assert!(!sink.is_closed());
        sink.close().await.unwrap();
        assert!(sink.is_closed());
    }
}
