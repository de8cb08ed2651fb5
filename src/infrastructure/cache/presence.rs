//! Presence Store
//!
//! Redis-backed online flags per (channel, user). Flags carry a TTL so a
//! crashed gateway process cannot leave users online forever; live
//! connections refresh the flag on their heartbeat cadence.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::keys;
use crate::domain::stores::PresenceStore;
use crate::shared::error::AppError;

/// Redis presence flag store.
#[derive(Clone)]
pub struct RedisPresenceStore {
    redis: ConnectionManager,
    ttl_secs: u64,
}

impl RedisPresenceStore {
    pub fn new(redis: ConnectionManager, ttl_secs: u64) -> Self {
        Self { redis, ttl_secs }
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn set_online(&self, channel: &str, user_id: i64) -> Result<(), AppError> {
        let key = keys::presence(channel, user_id);

        let mut conn = self.redis.clone();
        let _: () = conn.set_ex(&key, 1, self.ttl_secs).await?;

        Ok(())
    }

    async fn set_offline(&self, channel: &str, user_id: i64) -> Result<(), AppError> {
        let key = keys::presence(channel, user_id);

        let mut conn = self.redis.clone();
        let _: i64 = conn.del(&key).await?;

        Ok(())
    }

    async fn is_online(&self, channel: &str, user_id: i64) -> Result<bool, AppError> {
        let key = keys::presence(channel, user_id);

        let mut conn = self.redis.clone();
        let exists: bool = conn.exists(&key).await?;

        Ok(exists)
    }
}
