//! Cache Module
//!
//! Redis connection management and the store implementations backing the
//! delivery core's shared mutable state: sequence counters, unread
//! counters, conversation summaries, and presence flags.
//!
//! All of this state is cross-process. Implementations use Redis's native
//! atomic operations (INCR, HINCRBY) rather than read-modify-write so that
//! concurrent gateway processes never lose updates.

mod presence;
mod sequence;
mod summary;
mod unread;

pub use presence::RedisPresenceStore;
pub use sequence::RedisSequenceStore;
pub use summary::RedisSummaryStore;
pub use unread::RedisUnreadStore;

use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{info, instrument};

use crate::config::RedisSettings;

/// Creates a Redis connection manager with automatic reconnection.
///
/// The connection manager handles connection pooling and automatic
/// reconnection when the connection is lost.
#[instrument(skip(settings), fields(url = %settings.url))]
pub async fn create_redis_client(
    settings: &RedisSettings,
) -> Result<ConnectionManager, redis::RedisError> {
    info!("Connecting to Redis...");
    let client = Client::open(settings.url.as_str())?;
    let manager = ConnectionManager::new(client).await?;
    info!("Redis connection established");
    Ok(manager)
}

/// Cache key prefixes for the delivery core's Redis footprint.
///
/// Use these helpers to keep key naming consistent across stores.
pub mod keys {
    use crate::domain::value_objects::ConversationKey;

    /// Prefix for per-conversation sequence counters
    pub const SEQUENCE: &str = "im:chat:sequence:";

    /// Prefix for per-user unread hashes
    pub const UNREAD: &str = "im:chat:unread:";

    /// Prefix for per-conversation last-message summaries
    pub const SUMMARY: &str = "im:chat:summary:";

    /// Prefix for per-(channel, user) presence flags
    pub const PRESENCE: &str = "im:presence:";

    /// Sequence counter key for a conversation
    #[inline]
    pub fn sequence(key: &ConversationKey, viewer_id: i64) -> String {
        format!("{}{}", SEQUENCE, key.canonical_suffix(viewer_id))
    }

    /// Unread hash key for a user
    #[inline]
    pub fn unread(user_id: i64) -> String {
        format!("{}{}", UNREAD, user_id)
    }

    /// Summary key for a conversation
    #[inline]
    pub fn summary(key: &ConversationKey, viewer_id: i64) -> String {
        format!("{}{}", SUMMARY, key.canonical_suffix(viewer_id))
    }

    /// Presence key for a user on a channel
    #[inline]
    pub fn presence(channel: &str, user_id: i64) -> String {
        format!("{}{}:{}", PRESENCE, channel, user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::keys;
    use crate::domain::value_objects::ConversationKey;

    #[test]
    fn sequence_key_is_direction_independent_for_direct_chats() {
        let a_to_b = keys::sequence(&ConversationKey::direct(9), 4);
        let b_to_a = keys::sequence(&ConversationKey::direct(4), 9);
        assert_eq!(a_to_b, b_to_a);
        assert_eq!(a_to_b, "im:chat:sequence:1_4_9");
    }

    #[test]
    fn presence_key_includes_channel() {
        assert_eq!(keys::presence("chat", 7), "im:presence:chat:7");
    }
}
