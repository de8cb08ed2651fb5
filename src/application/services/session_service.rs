//! Session Service
//!
//! Builds the client-facing conversation list by reconciling persisted
//! session rows with unread entries that have not yet materialized a row,
//! then attaching summary, unread, and presence data.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::entities::SessionRepository;
use crate::domain::stores::{PresenceStore, SummaryStore, UnreadStore, CHANNEL_CHAT};
use crate::domain::value_objects::{ConversationKey, TalkType};
use crate::shared::error::AppError;

/// One entry of the conversation list.
#[derive(Debug, Clone, Serialize)]
pub struct SessionItem {
    pub id: i64,
    pub talk_type: TalkType,
    pub receiver_id: i64,
    pub name: String,
    pub avatar: String,
    pub unread_num: i64,
    /// Counterpart online flag; always false for group conversations
    pub is_online: bool,
    pub msg_text: String,
    pub updated_at: DateTime<Utc>,
}

/// Session reconciler.
pub struct SessionService {
    sessions: Arc<dyn SessionRepository>,
    unread: Arc<dyn UnreadStore>,
    summaries: Arc<dyn SummaryStore>,
    presence: Arc<dyn PresenceStore>,
}

impl SessionService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        unread: Arc<dyn UnreadStore>,
        summaries: Arc<dyn SummaryStore>,
        presence: Arc<dyn PresenceStore>,
    ) -> Self {
        Self {
            sessions,
            unread,
            summaries,
            presence,
        }
    }

    /// Ordered (most recent first) conversation list for a user.
    ///
    /// Unread entries without a session row are materialized first, so a
    /// conversation with unread messages always appears even when the
    /// row-creation step raced behind message delivery. A failure to read
    /// or write persisted rows is fatal to the request; summary and
    /// presence reads degrade to placeholders.
    pub async fn list_sessions(&self, user_id: i64) -> Result<Vec<SessionItem>, AppError> {
        let unread = match self.unread.all(user_id).await {
            Ok(counts) => counts,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Unread snapshot failed, listing without counts");
                Default::default()
            }
        };

        let mut rows = self.sessions.list_for_user(user_id).await?;

        let known: HashSet<ConversationKey> = rows.iter().map(|r| r.key).collect();
        let missing: Vec<ConversationKey> = unread
            .keys()
            .filter(|key| !known.contains(key))
            .copied()
            .collect();

        if !missing.is_empty() {
            let created = self.sessions.batch_create(user_id, &missing).await?;
            tracing::debug!(user_id, created, "Materialized session rows from unread entries");
            rows = self.sessions.list_for_user(user_id).await?;
        }

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let unread_num = unread.get(&row.key).copied().unwrap_or(0);

            let last = match self.summaries.last_message(&row.key, user_id).await {
                Ok(last) => last,
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "Summary read failed, using placeholder");
                    None
                }
            };

            let is_online = row.key.talk_type == TalkType::Direct
                && match self.presence.is_online(CHANNEL_CHAT, row.key.receiver_id).await {
                    Ok(online) => online,
                    Err(e) => {
                        tracing::warn!(user_id, error = %e, "Presence read failed, assuming offline");
                        false
                    }
                };

            let (msg_text, updated_at) = match last {
                Some(last) => (last.text, last.at.max(row.updated_at)),
                None => (String::new(), row.updated_at),
            };

            items.push(SessionItem {
                id: row.id,
                talk_type: row.key.talk_type,
                receiver_id: row.key.receiver_id,
                name: row.name,
                avatar: row.avatar,
                unread_num,
                is_online,
                msg_text,
                updated_at,
            });
        }

        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(items)
    }

    /// Acknowledge a conversation as read: the unread counter drops to zero.
    pub async fn clear_unread(&self, user_id: i64, key: ConversationKey) -> Result<(), AppError> {
        self.unread.clear(user_id, &key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    use crate::domain::entities::{MockSessionRepository, TalkSessionRow};
    use crate::domain::stores::{
        LastMessage, MockPresenceStore, MockSummaryStore, MockUnreadStore,
    };

    struct Mocks {
        sessions: MockSessionRepository,
        unread: MockUnreadStore,
        summaries: MockSummaryStore,
        presence: MockPresenceStore,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                sessions: MockSessionRepository::new(),
                unread: MockUnreadStore::new(),
                summaries: MockSummaryStore::new(),
                presence: MockPresenceStore::new(),
            }
        }

        fn into_service(self) -> SessionService {
            SessionService::new(
                Arc::new(self.sessions),
                Arc::new(self.unread),
                Arc::new(self.summaries),
                Arc::new(self.presence),
            )
        }
    }

    fn row(id: i64, key: ConversationKey, name: &str) -> TalkSessionRow {
        TalkSessionRow {
            id,
            key,
            name: name.into(),
            avatar: String::new(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unread_conversation_without_a_row_is_materialized_and_listed() {
        let mut mocks = Mocks::new();
        let key = ConversationKey::group(42);

        mocks.unread.expect_all().returning(move |_| {
            let mut counts = HashMap::new();
            counts.insert(key, 3);
            Ok(counts)
        });
        // First listing misses the conversation; after materialization the
        // row appears.
        let mut call = 0;
        mocks.sessions.expect_list_for_user().returning(move |_| {
            call += 1;
            if call == 1 {
                Ok(vec![])
            } else {
                Ok(vec![row(10, key, "group 42")])
            }
        });
        mocks
            .sessions
            .expect_batch_create()
            .withf(move |_, keys| keys == [key])
            .times(1)
            .returning(|_, keys| Ok(keys.len() as u64));
        mocks.summaries.expect_last_message().returning(|_, _| Ok(None));

        let service = mocks.into_service();
        let items = service.list_sessions(8).await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].receiver_id, 42);
        assert_eq!(items[0].unread_num, 3);
    }

    #[tokio::test]
    async fn list_is_sorted_by_recency_and_attaches_presence() {
        let mut mocks = Mocks::new();
        let now = Utc::now();
        let direct = ConversationKey::direct(5);
        let group = ConversationKey::group(42);

        mocks.unread.expect_all().returning(|_| Ok(HashMap::new()));
        mocks.sessions.expect_list_for_user().returning(move |_| {
            Ok(vec![
                TalkSessionRow {
                    id: 1,
                    key: direct,
                    name: "alice".into(),
                    avatar: String::new(),
                    updated_at: now - Duration::hours(2),
                },
                TalkSessionRow {
                    id: 2,
                    key: group,
                    name: "team".into(),
                    avatar: String::new(),
                    updated_at: now - Duration::hours(3),
                },
            ])
        });
        // The direct chat has a fresher summary, the group none at all.
        mocks
            .summaries
            .expect_last_message()
            .withf(move |k, _| *k == direct)
            .returning(move |_, _| {
                Ok(Some(LastMessage {
                    text: "see you".into(),
                    at: now,
                }))
            });
        mocks
            .summaries
            .expect_last_message()
            .withf(move |k, _| *k == group)
            .returning(|_, _| Ok(None));
        mocks
            .presence
            .expect_is_online()
            .with(eq(CHANNEL_CHAT), eq(5))
            .returning(|_, _| Ok(true));

        let service = mocks.into_service();
        let items = service.list_sessions(8).await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].receiver_id, 5);
        assert_eq!(items[0].msg_text, "see you");
        assert!(items[0].is_online);
        assert_eq!(items[1].receiver_id, 42);
        assert_eq!(items[1].msg_text, "");
        assert!(!items[1].is_online);
    }

    #[tokio::test]
    async fn cache_failures_degrade_to_placeholders() {
        let mut mocks = Mocks::new();
        let direct = ConversationKey::direct(5);

        mocks
            .unread
            .expect_all()
            .returning(|_| Err(AppError::Internal("redis down".into())));
        mocks
            .sessions
            .expect_list_for_user()
            .returning(move |_| Ok(vec![row(1, direct, "alice")]));
        mocks
            .summaries
            .expect_last_message()
            .returning(|_, _| Err(AppError::Internal("redis down".into())));
        mocks
            .presence
            .expect_is_online()
            .returning(|_, _| Err(AppError::Internal("redis down".into())));

        let service = mocks.into_service();
        let items = service.list_sessions(8).await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].unread_num, 0);
        assert_eq!(items[0].msg_text, "");
        assert!(!items[0].is_online);
    }

    #[tokio::test]
    async fn row_read_failure_is_fatal() {
        let mut mocks = Mocks::new();

        mocks.unread.expect_all().returning(|_| Ok(HashMap::new()));
        mocks
            .sessions
            .expect_list_for_user()
            .returning(|_| Err(AppError::Internal("db down".into())));

        let service = mocks.into_service();
        assert!(service.list_sessions(8).await.is_err());
    }

    #[tokio::test]
    async fn clear_unread_delegates_to_the_store() {
        let mut mocks = Mocks::new();
        let key = ConversationKey::direct(5);

        mocks
            .unread
            .expect_clear()
            .with(eq(8), eq(key))
            .times(1)
            .returning(|_, _| Ok(()));

        let service = mocks.into_service();
        service.clear_unread(8, key).await.unwrap();
    }
}
