//! Group Repository Implementation
//!
//! PostgreSQL implementation of group and membership lookups used for
//! permission checks and fan-out targeting.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::entities::{Group, GroupMember, GroupRepository, GroupRole};
use crate::shared::error::AppError;

/// PostgreSQL group repository.
pub struct PgGroupRepository {
    pool: PgPool,
}

impl PgGroupRepository {
    /// Creates a new PgGroupRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GroupRow {
    id: i64,
    name: String,
    avatar: String,
    owner_id: i64,
    is_dismiss: bool,
    is_mute: bool,
    created_at: DateTime<Utc>,
}

impl GroupRow {
    fn into_group(self) -> Group {
        Group {
            id: self.id,
            name: self.name,
            avatar: self.avatar,
            owner_id: self.owner_id,
            is_dismiss: self.is_dismiss,
            is_mute: self.is_mute,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GroupMemberRow {
    id: i64,
    group_id: i64,
    user_id: i64,
    role: i16,
    is_quit: bool,
    is_mute: bool,
    created_at: DateTime<Utc>,
}

impl GroupMemberRow {
    fn into_member(self) -> GroupMember {
        GroupMember {
            id: self.id,
            group_id: self.group_id,
            user_id: self.user_id,
            role: GroupRole::from_i16(self.role),
            is_quit: self.is_quit,
            is_mute: self.is_mute,
            created_at: self.created_at,
        }
    }
}

#[async_trait]
impl GroupRepository for PgGroupRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Group>, AppError> {
        let row = sqlx::query_as::<_, GroupRow>(
            r#"
            SELECT id, name, avatar, owner_id, is_dismiss, is_mute, created_at
            FROM groups
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_group()))
    }

    async fn find_member(
        &self,
        group_id: i64,
        user_id: i64,
    ) -> Result<Option<GroupMember>, AppError> {
        let row = sqlx::query_as::<_, GroupMemberRow>(
            r#"
            SELECT id, group_id, user_id, role, is_quit, is_mute, created_at
            FROM group_members
            WHERE group_id = $1 AND user_id = $2
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_member()))
    }

    async fn member_ids(&self, group_id: i64) -> Result<Vec<i64>, AppError> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            "SELECT user_id FROM group_members WHERE group_id = $1 AND is_quit = FALSE",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn admin_ids(&self, group_id: i64) -> Result<Vec<i64>, AppError> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT user_id
            FROM group_members
            WHERE group_id = $1 AND is_quit = FALSE AND role IN (1, 2)
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
