//! In-process consumer side: routes messages to handlers and redelivers
//! unacknowledged ones after the ack-wait window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};

use crate::config::schema::PubSubConfig;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::pubsub::Message;

/// One delivery attempt of a message.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub subject: String,
    pub payload: Vec<u8>,
    /// 1 for the first delivery.
    pub attempt: u32,
}

impl Delivery {
    pub fn redelivered(&self) -> bool {
        self.attempt > 1
    }
}

/// What the handler wants done with a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Done; never deliver again.
    Ack,
    /// Failed; redeliver immediately.
    Nack,
    /// Failed; let the ack-wait window lapse and redeliver.
    AwaitRedelivery,
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Disposition;
}

pub struct Dispatcher {
    routes: HashMap<String, Arc<dyn Handler>>,
    ack_wait: Duration,
    max_deliveries: u32,
}

impl Dispatcher {
    pub fn new(ack_wait: Duration, max_deliveries: u32) -> Self {
        Self {
            routes: HashMap::new(),
            ack_wait,
            max_deliveries: max_deliveries.max(1),
        }
    }

    pub fn from_config(config: &PubSubConfig) -> Self {
        Self::new(Duration::from_secs(config.ack_wait_secs), config.max_deliveries)
    }

    pub fn route(mut self, subject: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.routes.insert(subject.into(), handler);
        self
    }

    pub fn subjects(&self) -> Vec<String> {
        self.routes.keys().cloned().collect()
    }

    /// Consume `messages` until the stream ends or shutdown is signaled.
    /// Each message is handled on its own task.
    pub async fn run(self, mut messages: BoxStream<'static, Message>, mut shutdown: ShutdownSignal) {
        tracing::info!(subjects = ?self.subjects(), "Dispatcher started");

        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = messages.next() => match next {
                    Some(message) => message,
                    None => break,
                },
            };

            let Some(handler) = self.routes.get(&message.subject).cloned() else {
                continue;
            };
            tokio::spawn(deliver(
                handler,
                message,
                self.ack_wait,
                self.max_deliveries,
                shutdown.clone(),
            ));
        }

        tracing::info!("Dispatcher stopped");
    }
}

async fn deliver(
    handler: Arc<dyn Handler>,
    message: Message,
    ack_wait: Duration,
    max_deliveries: u32,
    mut shutdown: ShutdownSignal,
) {
    let mut delivery = Delivery {
        subject: message.subject,
        payload: message.payload,
        attempt: 1,
    };

    loop {
        let disposition = handler.handle(&delivery).await;
        if disposition == Disposition::Ack {
            return;
        }
        if delivery.attempt >= max_deliveries {
            tracing::warn!(
                subject = %delivery.subject,
                attempts = delivery.attempt,
                "Dropping message after max deliveries"
            );
            return;
        }
        if disposition == Disposition::AwaitRedelivery {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(ack_wait) => {}
            }
        }

        delivery.attempt += 1;
        metrics::record_redelivery(&delivery.subject);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use crate::pubsub::{BroadcastPublisher, Publisher};
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<Vec<Disposition>>,
        seen: Mutex<Vec<(u32, bool)>>,
    }

    impl Scripted {
        fn new(mut replies: Vec<Disposition>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Handler for Scripted {
        async fn handle(&self, delivery: &Delivery) -> Disposition {
            self.seen
                .lock()
                .unwrap()
                .push((delivery.attempt, delivery.redelivered()));
            self.replies.lock().unwrap().pop().unwrap_or(Disposition::Ack)
        }
    }

    async fn dispatch_one(handler: Arc<Scripted>, max_deliveries: u32) {
        let publisher = BroadcastPublisher::new(8);
        let shutdown = Shutdown::new();
        let dispatcher = Dispatcher::new(Duration::from_millis(10), max_deliveries)
            .route("t.subject", handler);
        let task = tokio::spawn(dispatcher.run(publisher.stream(), shutdown.subscribe()));

        publisher.publish("t.other", Vec::new()).await.unwrap();
        publisher.publish("t.subject", b"1".to_vec()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        shutdown.trigger();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_redelivers_until_ack() {
        let handler = Scripted::new(vec![Disposition::AwaitRedelivery, Disposition::Nack]);
        dispatch_one(handler.clone(), 8).await;

        let seen = handler.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![(1, false), (2, true), (3, true)]);
    }

    #[tokio::test]
    async fn test_stops_at_max_deliveries() {
        let handler = Scripted::new(vec![Disposition::AwaitRedelivery; 10]);
        dispatch_one(handler.clone(), 3).await;

        assert_eq!(handler.seen.lock().unwrap().len(), 3);
    }
}
