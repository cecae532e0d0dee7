//! Redis PUBLISH/SUBSCRIBE transport.

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::pubsub::{Message, PublishError, Publisher};

impl From<redis::RedisError> for PublishError {
    fn from(err: redis::RedisError) -> Self {
        PublishError::Backend(err.to_string())
    }
}

#[derive(Clone)]
pub struct RedisPublisher {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisPublisher {
    pub async fn connect(url: &str) -> Result<Self, PublishError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        tracing::info!(url = %url, "Connected to Redis publisher");
        Ok(Self { client, conn })
    }

    /// Subscribe to `subjects` on a dedicated connection.
    pub async fn stream(&self, subjects: &[String]) -> Result<BoxStream<'static, Message>, PublishError> {
        let mut pubsub = self.client.get_async_connection().await?.into_pubsub();
        for subject in subjects {
            pubsub.subscribe(subject).await?;
        }
        Ok(pubsub
            .into_on_message()
            .map(|msg| Message {
                subject: msg.get_channel_name().to_string(),
                payload: msg.get_payload_bytes().to_vec(),
            })
            .boxed())
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        let mut conn = self.conn.clone();
        let _receivers: i64 = conn.publish(subject, payload).await?;
        Ok(())
    }
}
