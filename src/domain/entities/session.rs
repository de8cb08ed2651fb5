//! Conversation session entity and repository trait.
//!
//! A session row associates a user with a conversation and drives the
//! client's conversation list. Maps to the `talk_sessions` table keyed by
//! (user_id, talk_type, receiver_id).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::value_objects::ConversationKey;
use crate::shared::error::AppError;

/// A persisted session row joined with the counterpart's display fields.
///
/// `name`/`avatar` come from the `users` table for direct conversations and
/// from the `groups` table for group conversations; either may be empty when
/// the counterpart row is gone.
#[derive(Debug, Clone)]
pub struct TalkSessionRow {
    pub id: i64,
    pub key: ConversationKey,
    pub name: String,
    pub avatar: String,
    pub updated_at: DateTime<Utc>,
}

/// Repository trait for conversation session rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// All session rows for a user, with counterpart display fields joined.
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<TalkSessionRow>, AppError>;

    /// Materialize missing session rows in one statement. Existing rows are
    /// left untouched. Returns the number of rows inserted.
    async fn batch_create(
        &self,
        user_id: i64,
        keys: &[ConversationKey],
    ) -> Result<u64, AppError>;

    /// Upsert a session row and bump its `updated_at`.
    async fn touch(&self, user_id: i64, key: &ConversationKey) -> Result<(), AppError>;

    /// Users holding a direct session row pointing at the given user. Used
    /// to resolve presence-update fan-out targets.
    async fn direct_partner_ids(&self, user_id: i64) -> Result<Vec<i64>, AppError>;
}
