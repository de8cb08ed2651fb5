//! Unread Store
//!
//! Redis-backed per-(user, conversation) unread counters.
//!
//! Counters for one user live in a single hash keyed by the user id, with
//! one field per conversation. `HINCRBY` keeps concurrent increments from
//! different gateway processes lossless.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::keys;
use crate::domain::stores::UnreadStore;
use crate::domain::value_objects::ConversationKey;
use crate::shared::error::AppError;

/// Redis unread counter store.
#[derive(Clone)]
pub struct RedisUnreadStore {
    redis: ConnectionManager,
}

impl RedisUnreadStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl UnreadStore for RedisUnreadStore {
    async fn increment(&self, user_id: i64, key: &ConversationKey) -> Result<i64, AppError> {
        let hash_key = keys::unread(user_id);
        let field = key.as_field();

        let mut conn = self.redis.clone();
        let value: i64 = conn.hincr(&hash_key, &field, 1).await?;

        tracing::trace!(user_id, field = %field, unread = value, "Unread incremented");

        Ok(value)
    }

    async fn all(&self, user_id: i64) -> Result<HashMap<ConversationKey, i64>, AppError> {
        let hash_key = keys::unread(user_id);

        let mut conn = self.redis.clone();
        let fields: HashMap<String, i64> = conn.hgetall(&hash_key).await?;

        // Fields that fail to parse are stale writes from an incompatible
        // build; skip them instead of failing the whole snapshot.
        let counts = fields
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .filter_map(|(field, count)| {
                ConversationKey::from_field(&field).map(|key| (key, count))
            })
            .collect();

        Ok(counts)
    }

    async fn clear(&self, user_id: i64, key: &ConversationKey) -> Result<(), AppError> {
        let hash_key = keys::unread(user_id);
        let field = key.as_field();

        let mut conn = self.redis.clone();
        let _: i64 = conn.hdel(&hash_key, &field).await?;

        tracing::trace!(user_id, field = %field, "Unread cleared");

        Ok(())
    }
}
