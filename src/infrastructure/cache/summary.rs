//! Summary Store
//!
//! Redis-backed last-message snippets per conversation. Last-writer-wins;
//! the record log stays authoritative.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::keys;
use crate::domain::stores::{LastMessage, SummaryStore};
use crate::domain::value_objects::ConversationKey;
use crate::shared::error::AppError;

/// Redis conversation summary store.
#[derive(Clone)]
pub struct RedisSummaryStore {
    redis: ConnectionManager,
}

impl RedisSummaryStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl SummaryStore for RedisSummaryStore {
    async fn set_last_message(
        &self,
        key: &ConversationKey,
        viewer_id: i64,
        last: &LastMessage,
    ) -> Result<(), AppError> {
        let cache_key = keys::summary(key, viewer_id);
        let value = serde_json::to_string(last)
            .map_err(|e| AppError::Internal(format!("Summary serialization failed: {}", e)))?;

        let mut conn = self.redis.clone();
        let _: () = conn.set(&cache_key, value).await?;

        Ok(())
    }

    async fn last_message(
        &self,
        key: &ConversationKey,
        viewer_id: i64,
    ) -> Result<Option<LastMessage>, AppError> {
        let cache_key = keys::summary(key, viewer_id);

        let mut conn = self.redis.clone();
        let value: Option<String> = conn.get(&cache_key).await?;

        match value {
            Some(json) => {
                let last = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Summary deserialization failed: {}", e))
                })?;
                Ok(Some(last))
            }
            None => Ok(None),
        }
    }
}
