//! Talk Record Handlers
//!
//! Message history for one conversation with keyset pagination.

use axum::{
    extract::{Extension, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::{MessageRepository, TalkRecord};
use crate::domain::value_objects::{ConversationKey, TalkType};
use crate::infrastructure::repositories::PgMessageRepository;
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// History query parameters
#[derive(Debug, Deserialize)]
pub struct RecordsQuery {
    pub talk_type: i16,
    pub receiver_id: i64,
    pub before_sequence: Option<i64>,
    pub limit: Option<i32>,
}

/// One history entry. Revoked records keep their id and sequence but drop
/// the payload.
#[derive(Debug, Serialize)]
pub struct RecordItem {
    pub id: i64,
    pub msg_type: i16,
    pub talk_type: i16,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub sequence: i64,
    pub content: String,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl From<TalkRecord> for RecordItem {
    fn from(record: TalkRecord) -> Self {
        let content = if record.is_revoked {
            String::new()
        } else {
            record.content
        };
        Self {
            id: record.id,
            msg_type: record.msg_type.as_i16(),
            talk_type: record.talk_type.as_i16(),
            sender_id: record.sender_id,
            receiver_id: record.receiver_id,
            sequence: record.sequence,
            content,
            is_revoked: record.is_revoked,
            created_at: record.created_at,
        }
    }
}

/// Get conversation history, newest first.
pub async fn get_records(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<Vec<RecordItem>>, AppError> {
    let talk_type = TalkType::try_from(query.talk_type)
        .map_err(|_| AppError::BadRequest("Invalid talk_type".into()))?;
    let key = ConversationKey {
        talk_type,
        receiver_id: query.receiver_id,
    };

    let message_repo = PgMessageRepository::new(state.db.clone());
    let records = message_repo
        .find_by_conversation(
            auth.user_id,
            &key,
            query.before_sequence,
            query.limit.unwrap_or(30),
        )
        .await?;

    Ok(Json(records.into_iter().map(RecordItem::from).collect()))
}
