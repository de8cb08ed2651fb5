//! Sequence Store
//!
//! Redis-backed per-conversation sequence counters.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::keys;
use crate::domain::stores::SequenceStore;
use crate::domain::value_objects::ConversationKey;
use crate::shared::error::AppError;

/// Issues sequence numbers via atomic `INCR` on a shared counter key.
///
/// `INCR` on a missing key yields 1, which is exactly the contract for an
/// unseen conversation. The counter is never decremented: a message insert
/// that fails after its number was reserved leaves that number permanently
/// skipped, so observed sequences are strictly increasing with gaps allowed.
#[derive(Clone)]
pub struct RedisSequenceStore {
    redis: ConnectionManager,
}

impl RedisSequenceStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl SequenceStore for RedisSequenceStore {
    async fn next(&self, key: &ConversationKey, sender_id: i64) -> Result<i64, AppError> {
        let counter_key = keys::sequence(key, sender_id);

        let mut conn = self.redis.clone();
        let value: i64 = conn.incr(&counter_key, 1).await?;

        tracing::trace!(key = %counter_key, sequence = value, "Sequence issued");

        Ok(value)
    }
}
