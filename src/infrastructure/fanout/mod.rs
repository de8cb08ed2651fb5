//! Fan-out Publisher
//!
//! Publishes domain events onto the shared Redis pub/sub topic that every
//! gateway process subscribes to. The topic carries `{event, data}` JSON
//! envelopes; the subscriber side lives in the websocket bridge.
//!
//! Delivery contract: at-most-once per process. `PUBLISH` reports how many
//! subscribers received the message and zero is a valid outcome — an event
//! nobody was listening for is lost by design, and offline recipients catch
//! up from persisted history on their next session-list fetch.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::domain::events::{FanoutEvent, FanoutPublisher};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// Shared pub/sub topic for all chat delivery events.
pub const CHAT_TOPIC: &str = "im:chat";

/// Redis-backed fan-out publisher.
#[derive(Clone)]
pub struct RedisFanoutPublisher {
    redis: ConnectionManager,
}

impl RedisFanoutPublisher {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl FanoutPublisher for RedisFanoutPublisher {
    async fn publish(&self, event: &FanoutEvent) -> Result<(), AppError> {
        let payload = event
            .encode()
            .map_err(|e| AppError::Internal(format!("Event serialization failed: {}", e)))?;

        let mut conn = self.redis.clone();
        let receivers: i64 = conn.publish(CHAT_TOPIC, payload).await?;

        metrics::record_fanout_published(event.event_name());
        tracing::debug!(
            event = event.event_name(),
            receivers,
            "Fan-out event published"
        );

        Ok(())
    }
}
