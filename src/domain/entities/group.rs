//! Group entity, membership, and repository trait.
//!
//! Maps to the `groups` and `group_members` tables. Only the fields the
//! delivery core consults for permission checks and fan-out targeting are
//! modeled here; group CRUD lives in the out-of-scope API service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::shared::error::AppError;

/// Member role within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupRole {
    Owner,
    Admin,
    Member,
}

impl GroupRole {
    pub fn as_i16(self) -> i16 {
        match self {
            GroupRole::Owner => 1,
            GroupRole::Admin => 2,
            GroupRole::Member => 3,
        }
    }

    pub fn from_i16(value: i16) -> Self {
        match value {
            1 => GroupRole::Owner,
            2 => GroupRole::Admin,
            _ => GroupRole::Member,
        }
    }

    /// Owners and admins keep speaking rights while the group is muted.
    pub fn is_privileged(self) -> bool {
        matches!(self, GroupRole::Owner | GroupRole::Admin)
    }
}

/// A chat group.
#[derive(Debug, Clone)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub avatar: String,
    pub owner_id: i64,
    /// Group has been dismissed; no member may send
    pub is_dismiss: bool,
    /// All-member mute; only privileged roles may send
    pub is_mute: bool,
    pub created_at: DateTime<Utc>,
}

/// A group membership row.
#[derive(Debug, Clone)]
pub struct GroupMember {
    pub id: i64,
    pub group_id: i64,
    pub user_id: i64,
    pub role: GroupRole,
    /// Member has left or was removed; treated as not-a-member
    pub is_quit: bool,
    /// Member is individually gagged
    pub is_mute: bool,
    pub created_at: DateTime<Utc>,
}

/// Repository trait for group membership lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Find a group by id.
    async fn find_by_id(&self, id: i64) -> Result<Option<Group>, AppError>;

    /// Find one member row, including quit members.
    async fn find_member(
        &self,
        group_id: i64,
        user_id: i64,
    ) -> Result<Option<GroupMember>, AppError>;

    /// Active (non-quit) member ids of a group.
    async fn member_ids(&self, group_id: i64) -> Result<Vec<i64>, AppError>;

    /// Active owner/admin ids of a group, for apply notifications.
    async fn admin_ids(&self, group_id: i64) -> Result<Vec<i64>, AppError>;
}
