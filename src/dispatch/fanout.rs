//! Consumer endpoints and the fan-out dispatcher

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::chunk::StreamChunk;

/// Default queue capacity per consumer, in chunks
pub const DEFAULT_CONSUMER_CAPACITY: usize = 256;

/// Sending side of a consumer's chunk queue
#[derive(Debug, Clone)]
pub struct Consumer {
    name: Arc<str>,
    tx: mpsc::Sender<StreamChunk>,
    /// Set once the receiver is gone, so the closure is only logged once
    closed: Arc<AtomicBool>,
}

impl Consumer {
    /// Wrap an existing sender
    pub fn new(name: impl Into<Arc<str>>, tx: mpsc::Sender<StreamChunk>) -> Self {
        Self {
            name: name.into(),
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create an unnamed consumer and its receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StreamChunk>) {
        Self::named("consumer", capacity)
    }

    /// Create a named consumer and its receiving end
    pub fn named(
        name: impl Into<Arc<str>>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<StreamChunk>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(name, tx), rx)
    }

    /// Consumer name used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the receiving end has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Deliver a chunk, waiting for queue capacity
    ///
    /// Returns false if the receiving end is gone.
    pub async fn deliver(&self, chunk: StreamChunk) -> bool {
        match self.tx.send(chunk).await {
            Ok(()) => true,
            Err(mpsc::error::SendError(chunk)) => {
                if !self.closed.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        consumer = %self.name,
                        channel = %chunk.channel,
                        "Consumer endpoint closed, chunks for it are discarded"
                    );
                }
                false
            }
        }
    }
}

/// Delivers every chunk to every consumer
///
/// The consumer set is fixed at construction.
#[derive(Debug, Clone)]
pub struct FanOut {
    consumers: Arc<[Consumer]>,
}

impl FanOut {
    /// Create a dispatcher over a fixed set of consumers
    pub fn new(consumers: Vec<Consumer>) -> Self {
        Self {
            consumers: consumers.into(),
        }
    }

    /// Number of configured consumers
    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    /// Check if no consumers are configured
    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Configured consumers
    pub fn consumers(&self) -> &[Consumer] {
        &self.consumers
    }

    /// Deliver a chunk to each consumer in order
    ///
    /// Waits on each consumer's queue in turn. Returns how many consumers
    /// accepted the chunk.
    pub async fn dispatch(&self, chunk: StreamChunk) -> usize {
        let mut delivered = 0;

        if let Some((last, rest)) = self.consumers.split_last() {
            for consumer in rest {
                if consumer.deliver(chunk.clone()).await {
                    delivered += 1;
                }
            }
            if last.deliver(chunk).await {
                delivered += 1;
            }
        }

        delivered
    }
}

impl Default for FanOut {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
