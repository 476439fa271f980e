//! In-memory sink for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

use crate::batch::{SinkError, StreamSink};
use crate::events::ProgressEvent;

/// Sink that records every delivered event.
///
/// Can simulate a client that disconnects after a number of events, or at
/// any point via [`close`](Self::close).
#[derive(Debug, Clone)]
pub struct RecordingSink {
    events: Arc<RwLock<Vec<ProgressEvent>>>,
    close_after: Option<usize>,
    closed: Arc<watch::Sender<bool>>,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            close_after: None,
            closed: Arc::new(watch::Sender::new(false)),
        }
    }

    /// Disconnects once `count` events have been delivered.
    pub fn closing_after(count: usize) -> Self {
        let sink = Self {
            close_after: Some(count),
            ..Self::new()
        };
        if count == 0 {
            sink.close();
        }
        sink
    }

    /// Simulates the client going away.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    pub async fn events(&self) -> Vec<ProgressEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl StreamSink for RecordingSink {
    async fn emit(&mut self, event: &ProgressEvent) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        let mut events = self.events.write().await;
        events.push(event.clone());
        if self.close_after.is_some_and(|n| events.len() >= n) {
            self.close();
        }
        Ok(())
    }

    async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives as long as self, so this only returns once closed.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}
