//! Session Handlers
//!
//! Conversation list and read acknowledgment endpoints.

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::application::services::SessionItem;
use crate::domain::value_objects::{ConversationKey, TalkType};
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Get the caller's ordered conversation list.
///
/// Conversations with unread messages always appear, even when their
/// session row lagged behind message delivery.
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<SessionItem>>, AppError> {
    let items = state.sessions.list_sessions(auth.user_id).await?;
    Ok(Json(items))
}

/// Read acknowledgment request body.
#[derive(Debug, Deserialize)]
pub struct ClearUnreadRequest {
    pub talk_type: TalkType,
    pub receiver_id: i64,
}

/// Acknowledge a conversation as read, zeroing its unread counter.
pub async fn clear_unread(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<ClearUnreadRequest>,
) -> Result<StatusCode, AppError> {
    let key = ConversationKey {
        talk_type: body.talk_type,
        receiver_id: body.receiver_id,
    };
    state.sessions.clear_unread(auth.user_id, key).await?;
    Ok(StatusCode::NO_CONTENT)
}
