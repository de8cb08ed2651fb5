//! Message Repository Implementation
//!
//! PostgreSQL implementation of talk record storage with keyset pagination
//! over the per-conversation sequence column.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::entities::{MessageRepository, NewTalkRecord, TalkRecord};
use crate::domain::value_objects::{ConversationKey, MessageType, TalkType};
use crate::shared::error::AppError;

/// PostgreSQL talk record repository.
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    /// Creates a new PgMessageRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Internal row type for record queries.
/// Maps to the talk_records table schema defined in the migration.
#[derive(Debug, sqlx::FromRow)]
struct TalkRecordRow {
    id: i64,
    msg_type: i16,
    talk_type: i16,
    sender_id: i64,
    receiver_id: i64,
    sequence: i64,
    content: String,
    is_revoked: bool,
    created_at: DateTime<Utc>,
}

impl TalkRecordRow {
    /// Converts database row to the domain TalkRecord entity.
    fn into_record(self) -> TalkRecord {
        TalkRecord {
            id: self.id,
            msg_type: MessageType::try_from(self.msg_type).unwrap_or_default(),
            talk_type: TalkType::try_from(self.talk_type).unwrap_or(TalkType::Direct),
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            sequence: self.sequence,
            content: self.content,
            is_revoked: self.is_revoked,
            created_at: self.created_at,
        }
    }
}

const RECORD_COLUMNS: &str = "id, msg_type, talk_type, sender_id, receiver_id, \
                              sequence, content, is_revoked, created_at";

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, record: &NewTalkRecord) -> Result<TalkRecord, AppError> {
        let row = sqlx::query_as::<_, TalkRecordRow>(
            r#"
            INSERT INTO talk_records
                (msg_type, talk_type, sender_id, receiver_id, sequence, content, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, msg_type, talk_type, sender_id, receiver_id,
                      sequence, content, is_revoked, created_at
            "#,
        )
        .bind(record.msg_type.as_i16())
        .bind(record.talk_type.as_i16())
        .bind(record.sender_id)
        .bind(record.receiver_id)
        .bind(record.sequence)
        .bind(&record.content)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_record())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<TalkRecord>, AppError> {
        let row = sqlx::query_as::<_, TalkRecordRow>(&format!(
            "SELECT {} FROM talk_records WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_record()))
    }

    /// Records of one conversation, newest first.
    ///
    /// Direct conversations match both directions of the pair so the viewer
    /// sees one merged timeline; group conversations match the group id.
    async fn find_by_conversation(
        &self,
        viewer_id: i64,
        key: &ConversationKey,
        before_sequence: Option<i64>,
        limit: i32,
    ) -> Result<Vec<TalkRecord>, AppError> {
        // Cap limit to prevent excessive queries
        let limit = limit.clamp(1, 100);
        let cursor = before_sequence.unwrap_or(i64::MAX);

        let rows = match key.talk_type {
            TalkType::Direct => {
                sqlx::query_as::<_, TalkRecordRow>(&format!(
                    r#"
                    SELECT {}
                    FROM talk_records
                    WHERE talk_type = 1
                      AND ((sender_id = $1 AND receiver_id = $2)
                        OR (sender_id = $2 AND receiver_id = $1))
                      AND sequence < $3
                    ORDER BY sequence DESC
                    LIMIT $4
                    "#,
                    RECORD_COLUMNS
                ))
                .bind(viewer_id)
                .bind(key.receiver_id)
                .bind(cursor)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            TalkType::Group => {
                sqlx::query_as::<_, TalkRecordRow>(&format!(
                    r#"
                    SELECT {}
                    FROM talk_records
                    WHERE talk_type = 2
                      AND receiver_id = $1
                      AND sequence < $2
                    ORDER BY sequence DESC
                    LIMIT $3
                    "#,
                    RECORD_COLUMNS
                ))
                .bind(key.receiver_id)
                .bind(cursor)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(|r| r.into_record()).collect())
    }

    async fn mark_revoked(&self, id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE talk_records SET is_revoked = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
