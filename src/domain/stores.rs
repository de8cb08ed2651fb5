//! Shared-state store traits.
//!
//! Sequence counters, unread counts, conversation summaries, and presence
//! flags live in an external shared store so every gateway process observes
//! the same state. The dispatcher never assumes in-process locking protects
//! any of this; implementations must use the backend's atomic primitives.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::value_objects::ConversationKey;
use crate::shared::error::AppError;

/// The gateway channel chat connections attach to. The registry and
/// presence store support multiple channels; the chat delivery core uses
/// this one.
pub const CHANNEL_CHAT: &str = "chat";

/// Issues monotonically increasing per-conversation sequence numbers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Atomic fetch-and-increment for the conversation's counter. The first
    /// call for an unseen conversation yields 1. Fails fast when the backing
    /// store is unreachable; callers must not persist a message without a
    /// sequence number.
    async fn next(&self, key: &ConversationKey, sender_id: i64) -> Result<i64, AppError>;
}

/// Per-(user, conversation) unread counters.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UnreadStore: Send + Sync {
    /// Add one unread message for the user's view of the conversation.
    async fn increment(&self, user_id: i64, key: &ConversationKey) -> Result<i64, AppError>;

    /// Snapshot of all nonzero unread counts for a user.
    async fn all(&self, user_id: i64) -> Result<HashMap<ConversationKey, i64>, AppError>;

    /// Reset the counter to zero.
    async fn clear(&self, user_id: i64, key: &ConversationKey) -> Result<(), AppError>;
}

/// Denormalized last-message snippet for conversation lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Last-message snippets per conversation. Best-effort and last-writer-wins;
/// the record log stays authoritative and a missed update self-heals on the
/// next message.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Overwrite the conversation's last-message snippet.
    async fn set_last_message(
        &self,
        key: &ConversationKey,
        viewer_id: i64,
        last: &LastMessage,
    ) -> Result<(), AppError>;

    /// Read the conversation's last-message snippet, if any.
    async fn last_message(
        &self,
        key: &ConversationKey,
        viewer_id: i64,
    ) -> Result<Option<LastMessage>, AppError>;
}

/// Per-(channel, user) online flags. Written only from the connection
/// open/close path; everything else just reads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn set_online(&self, channel: &str, user_id: i64) -> Result<(), AppError>;

    async fn set_offline(&self, channel: &str, user_id: i64) -> Result<(), AppError>;

    async fn is_online(&self, channel: &str, user_id: i64) -> Result<bool, AppError>;
}
