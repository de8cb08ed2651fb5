//! User entity and repository trait.
//!
//! The delivery core only needs existence checks and display fields; user
//! CRUD belongs to the out-of-scope API service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::shared::error::AppError;

/// A registered user, as the gateway sees one.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub nickname: String,
    pub avatar: String,
    pub created_at: DateTime<Utc>,
}

/// Repository trait for user lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user by id.
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;

    /// Whether a user exists.
    async fn exists(&self, id: i64) -> Result<bool, AppError>;
}
