//! Repository Implementations
//!
//! PostgreSQL-backed implementations of the domain repository traits.

mod group_repository;
mod message_repository;
mod session_repository;
mod user_repository;

pub use group_repository::PgGroupRepository;
pub use message_repository::PgMessageRepository;
pub use session_repository::PgSessionRepository;
pub use user_repository::PgUserRepository;
