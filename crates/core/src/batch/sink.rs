//! Delivering events to the client.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::events::ProgressEvent;

/// Errors returned by a [`StreamSink`].
#[derive(Debug, Error)]
pub enum SinkError {
    /// The client is gone; nothing further can be delivered.
    #[error("client disconnected")]
    Closed,

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Where a batch sends its events.
///
/// Delivery is attempted, not acknowledged. A [`SinkError::Closed`] means the
/// client has gone away.
#[async_trait]
pub trait StreamSink: Send + Sync {
    /// Serializes and hands off one event. Must not hold it back for batching.
    async fn emit(&mut self, event: &ProgressEvent) -> Result<(), SinkError>;

    /// Resolves once the client is known to be gone.
    ///
    /// The default never resolves, so disconnects are then only noticed on
    /// the next [`emit`](Self::emit).
    async fn closed(&self) {
        std::future::pending::<()>().await
    }
}

/// Frames an event as one server-sent event: `data: <json>\n\n`.
///
/// The JSON is compact, so it never contains a raw newline.
pub fn encode_sse_frame(event: &ProgressEvent) -> Result<String, serde_json::Error> {
    Ok(format!("data: {}\n\n", serde_json::to_string(event)?))
}

/// Sink that pushes encoded SSE frames into a bounded channel.
///
/// The receiving half becomes the response body. Dropping it (the client
/// disconnected) closes the sink.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    /// Creates a sink and the receiver that yields its frames in order.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl StreamSink for ChannelSink {
    async fn emit(&mut self, event: &ProgressEvent) -> Result<(), SinkError> {
        let frame = encode_sse_frame(event)?;
        self.tx.send(frame).await.map_err(|_| SinkError::Closed)
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}
