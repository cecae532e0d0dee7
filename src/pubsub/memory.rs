//! In-process publisher over a tokio broadcast channel.

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;

use crate::pubsub::{PublishError, Publisher};

/// One published event.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub subject: String,
    pub payload: Vec<u8>,
}

/// Publisher whose subscribers live in the same process.
///
/// Publishing with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<Message>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tx.subscribe()
    }

    /// Subscribe as a stream. Lagged messages are skipped with a warning.
    pub fn stream(&self) -> BoxStream<'static, Message> {
        stream::unfold(self.subscribe(), |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(message) => return Some((message, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped = skipped, "Subscriber lagged; messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl Publisher for BroadcastPublisher {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        let _ = self.tx.send(Message {
            subject: subject.to_string(),
            payload,
        });
        Ok(())
    }
}
