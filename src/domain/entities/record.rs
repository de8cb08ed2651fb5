//! Talk record entity and repository trait.
//!
//! Maps to the `talk_records` table:
//! - id: BIGSERIAL PRIMARY KEY
//! - msg_type: SMALLINT NOT NULL
//! - talk_type: SMALLINT NOT NULL
//! - sender_id: BIGINT NOT NULL
//! - receiver_id: BIGINT NOT NULL  -- user id or group id, per talk_type
//! - sequence: BIGINT NOT NULL    -- per-conversation ordinal
//! - content: TEXT NOT NULL       -- text, or JSON media descriptor
//! - is_revoked: BOOLEAN NOT NULL DEFAULT FALSE
//! - created_at: TIMESTAMPTZ NOT NULL DEFAULT NOW()

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{ConversationKey, MessageType, TalkType};
use crate::shared::error::AppError;

/// A persisted chat message.
///
/// Immutable once created; the only permitted mutation is setting the
/// `is_revoked` flag through [`MessageRepository::mark_revoked`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TalkRecord {
    /// Auto-increment primary key
    pub id: i64,

    /// Message kind (text, image, voice, ...)
    pub msg_type: MessageType,

    /// Conversation kind the record belongs to
    pub talk_type: TalkType,

    /// Author user id, always taken from the authenticated connection
    pub sender_id: i64,

    /// Counterpart user id (direct) or group id (group)
    pub receiver_id: i64,

    /// Per-conversation sequence ordinal; strictly increasing, gaps allowed
    pub sequence: i64,

    /// Text content or JSON-encoded media descriptor
    pub content: String,

    /// Whether the author has revoked the message
    pub is_revoked: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl TalkRecord {
    /// The conversation this record belongs to, from the sender's view.
    pub fn conversation(&self) -> ConversationKey {
        ConversationKey {
            talk_type: self.talk_type,
            receiver_id: self.receiver_id,
        }
    }
}

/// Fields for inserting a new record; the id is assigned by the database.
#[derive(Debug, Clone)]
pub struct NewTalkRecord {
    pub msg_type: MessageType,
    pub talk_type: TalkType,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub sequence: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Repository trait for talk record data access.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Insert a new record and return it with its assigned id.
    async fn create(&self, record: &NewTalkRecord) -> Result<TalkRecord, AppError>;

    /// Find a record by its primary key.
    async fn find_by_id(&self, id: i64) -> Result<Option<TalkRecord>, AppError>;

    /// Find records of one conversation with keyset pagination, newest
    /// first. `before_sequence` fetches records older than the cursor.
    async fn find_by_conversation(
        &self,
        viewer_id: i64,
        key: &ConversationKey,
        before_sequence: Option<i64>,
        limit: i32,
    ) -> Result<Vec<TalkRecord>, AppError>;

    /// Set the `is_revoked` flag on a record.
    async fn mark_revoked(&self, id: i64) -> Result<(), AppError>;
}
