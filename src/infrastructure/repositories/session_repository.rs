//! Session Repository Implementation
//!
//! PostgreSQL implementation of conversation session rows, including the
//! batch materialization used by the session reconciler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::entities::{SessionRepository, TalkSessionRow};
use crate::domain::value_objects::{ConversationKey, TalkType};
use crate::shared::error::AppError;

/// PostgreSQL conversation session repository.
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    /// Creates a new PgSessionRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Internal row type joining sessions with counterpart display fields.
#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: i64,
    talk_type: i16,
    receiver_id: i64,
    name: Option<String>,
    avatar: Option<String>,
    updated_at: DateTime<Utc>,
}

impl SessionRow {
    fn into_session(self) -> TalkSessionRow {
        TalkSessionRow {
            id: self.id,
            key: ConversationKey {
                talk_type: TalkType::try_from(self.talk_type).unwrap_or(TalkType::Direct),
                receiver_id: self.receiver_id,
            },
            name: self.name.unwrap_or_default(),
            avatar: self.avatar.unwrap_or_default(),
            updated_at: self.updated_at,
        }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<TalkSessionRow>, AppError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT s.id, s.talk_type, s.receiver_id, s.updated_at,
                   CASE WHEN s.talk_type = 1 THEN u.nickname ELSE g.name END AS name,
                   CASE WHEN s.talk_type = 1 THEN u.avatar ELSE g.avatar END AS avatar
            FROM talk_sessions s
            LEFT JOIN users u ON s.talk_type = 1 AND u.id = s.receiver_id
            LEFT JOIN groups g ON s.talk_type = 2 AND g.id = s.receiver_id
            WHERE s.user_id = $1
            ORDER BY s.updated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_session()).collect())
    }

    async fn batch_create(
        &self,
        user_id: i64,
        keys: &[ConversationKey],
    ) -> Result<u64, AppError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let talk_types: Vec<i16> = keys.iter().map(|k| k.talk_type.as_i16()).collect();
        let receiver_ids: Vec<i64> = keys.iter().map(|k| k.receiver_id).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO talk_sessions (talk_type, user_id, receiver_id, created_at, updated_at)
            SELECT t, $1, r, NOW(), NOW()
            FROM UNNEST($2::smallint[], $3::bigint[]) AS x(t, r)
            ON CONFLICT (user_id, talk_type, receiver_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(&talk_types)
        .bind(&receiver_ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn touch(&self, user_id: i64, key: &ConversationKey) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO talk_sessions (talk_type, user_id, receiver_id, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            ON CONFLICT (user_id, talk_type, receiver_id)
            DO UPDATE SET updated_at = NOW()
            "#,
        )
        .bind(key.talk_type.as_i16())
        .bind(user_id)
        .bind(key.receiver_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn direct_partner_ids(&self, user_id: i64) -> Result<Vec<i64>, AppError> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            "SELECT user_id FROM talk_sessions WHERE talk_type = 1 AND receiver_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
