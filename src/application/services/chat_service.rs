//! Chat Service
//!
//! The send/revoke pipeline behind the protocol dispatcher: permission
//! checks, sequence allocation, persistence, unread/summary bookkeeping,
//! and fan-out publication.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::entities::{
    GroupRepository, MessageRepository, NewTalkRecord, SessionRepository, TalkRecord,
    UserRepository,
};
use crate::domain::events::{FanoutEvent, FanoutPublisher, MessagePush, RevokePush};
use crate::domain::stores::{LastMessage, SequenceStore, SummaryStore, UnreadStore};
use crate::domain::value_objects::{ConversationKey, MessageType, TalkType};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// Maximum characters of a text message carried into the summary snippet.
const SUMMARY_CLIP_CHARS: usize = 30;

/// Errors surfaced to the sender of a message or revoke request.
///
/// Permission failures never tear down the connection; the dispatcher turns
/// them into an error frame for the sender only.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Receiver does not exist")]
    ReceiverNotFound,

    #[error("Group does not exist")]
    GroupNotFound,

    #[error("Not a member of this group")]
    NotMember,

    #[error("Group has been dismissed")]
    GroupDismissed,

    #[error("You are muted in this conversation")]
    Muted,

    #[error("Message not found")]
    RecordNotFound,

    #[error("Only the author can revoke a message")]
    NotAuthor,

    #[error("Failed to allocate sequence: {0}")]
    Sequence(#[source] AppError),

    #[error("Failed to persist message: {0}")]
    Storage(#[source] AppError),
}

impl SendError {
    /// Stable error code carried in error frames.
    pub fn code(&self) -> u16 {
        match self {
            SendError::ReceiverNotFound => 40001,
            SendError::GroupNotFound => 40002,
            SendError::NotMember => 40003,
            SendError::GroupDismissed => 40004,
            SendError::Muted => 40005,
            SendError::RecordNotFound => 40006,
            SendError::NotAuthor => 40007,
            SendError::Sequence(_) | SendError::Storage(_) => 50000,
        }
    }

    /// Whether the client may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SendError::Sequence(_) | SendError::Storage(_))
    }
}

/// Chat send/revoke pipeline.
pub struct ChatService {
    messages: Arc<dyn MessageRepository>,
    sessions: Arc<dyn SessionRepository>,
    groups: Arc<dyn GroupRepository>,
    users: Arc<dyn UserRepository>,
    sequences: Arc<dyn SequenceStore>,
    unread: Arc<dyn UnreadStore>,
    summaries: Arc<dyn SummaryStore>,
    publisher: Arc<dyn FanoutPublisher>,
}

impl ChatService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        sessions: Arc<dyn SessionRepository>,
        groups: Arc<dyn GroupRepository>,
        users: Arc<dyn UserRepository>,
        sequences: Arc<dyn SequenceStore>,
        unread: Arc<dyn UnreadStore>,
        summaries: Arc<dyn SummaryStore>,
        publisher: Arc<dyn FanoutPublisher>,
    ) -> Self {
        Self {
            messages,
            sessions,
            groups,
            users,
            sequences,
            unread,
            summaries,
            publisher,
        }
    }

    /// Persist a message into a conversation and propagate its side effects.
    ///
    /// Pipeline: permission check, sequence allocation, insert, then the
    /// best-effort tail (unread counters, summary, session touch, fan-out).
    /// The insert is the authority: everything after it is advisory and a
    /// failure there is logged and swallowed. The sequence is reserved
    /// before the insert, so a failed insert permanently skips that number.
    pub async fn send_message(
        &self,
        sender_id: i64,
        key: ConversationKey,
        msg_type: MessageType,
        content: String,
    ) -> Result<TalkRecord, SendError> {
        self.check_send_permission(sender_id, &key).await?;

        let sequence = self
            .sequences
            .next(&key, sender_id)
            .await
            .map_err(SendError::Sequence)?;

        let record = self
            .messages
            .create(&NewTalkRecord {
                msg_type,
                talk_type: key.talk_type,
                sender_id,
                receiver_id: key.receiver_id,
                sequence,
                content,
                created_at: Utc::now(),
            })
            .await
            .map_err(SendError::Storage)?;

        metrics::record_message_persisted();
        tracing::debug!(
            record_id = record.id,
            sender_id,
            talk_type = key.talk_type.as_i16(),
            receiver_id = key.receiver_id,
            sequence,
            "Message persisted"
        );

        self.apply_post_persist(&record).await;

        Ok(record)
    }

    /// Revoke a previously sent message. Only the author may revoke, and
    /// the record must belong to the addressed conversation. No sequence is
    /// consumed.
    pub async fn revoke_message(
        &self,
        sender_id: i64,
        key: ConversationKey,
        record_id: i64,
    ) -> Result<(), SendError> {
        let record = self
            .messages
            .find_by_id(record_id)
            .await
            .map_err(SendError::Storage)?
            .ok_or(SendError::RecordNotFound)?;

        if record.sender_id != sender_id {
            return Err(SendError::NotAuthor);
        }
        if record.talk_type != key.talk_type || record.receiver_id != key.receiver_id {
            return Err(SendError::RecordNotFound);
        }

        self.messages
            .mark_revoked(record.id)
            .await
            .map_err(SendError::Storage)?;

        let event = FanoutEvent::MessageRevoke(RevokePush {
            talk_type: record.talk_type,
            sender_id: record.sender_id,
            receiver_id: record.receiver_id,
            record_id: record.id,
        });
        if let Err(e) = self.publisher.publish(&event).await {
            tracing::warn!(record_id, error = %e, "Revoke fan-out failed");
        }

        Ok(())
    }

    /// Permission rules ahead of any state change.
    ///
    /// Direct: the counterpart must exist. Group: the group must exist and
    /// not be dismissed; the sender must be an active (non-quit) member,
    /// not individually gagged, and not silenced by an all-member mute
    /// (owners and admins are exempt from the latter).
    async fn check_send_permission(
        &self,
        sender_id: i64,
        key: &ConversationKey,
    ) -> Result<(), SendError> {
        match key.talk_type {
            TalkType::Direct => {
                let exists = self
                    .users
                    .exists(key.receiver_id)
                    .await
                    .map_err(SendError::Storage)?;
                if !exists {
                    return Err(SendError::ReceiverNotFound);
                }
                Ok(())
            }
            TalkType::Group => {
                let group = self
                    .groups
                    .find_by_id(key.receiver_id)
                    .await
                    .map_err(SendError::Storage)?
                    .ok_or(SendError::GroupNotFound)?;

                if group.is_dismiss {
                    return Err(SendError::GroupDismissed);
                }

                let member = self
                    .groups
                    .find_member(key.receiver_id, sender_id)
                    .await
                    .map_err(SendError::Storage)?
                    .filter(|m| !m.is_quit)
                    .ok_or(SendError::NotMember)?;

                if member.is_mute || (group.is_mute && !member.role.is_privileged()) {
                    return Err(SendError::Muted);
                }

                Ok(())
            }
        }
    }

    /// The advisory tail of the send pipeline. Each step is recoverable by
    /// recomputation or the next message, so failures are logged and
    /// swallowed rather than unwinding the already-persisted record.
    async fn apply_post_persist(&self, record: &TalkRecord) {
        let key = record.conversation();

        for user_id in self.recipients(record).await {
            // The recipient's view of a direct conversation points back at
            // the sender.
            let view = match record.talk_type {
                TalkType::Direct => ConversationKey::direct(record.sender_id),
                TalkType::Group => key,
            };
            if let Err(e) = self.unread.increment(user_id, &view).await {
                tracing::warn!(user_id, error = %e, "Unread increment failed");
            }
        }

        let last = LastMessage {
            text: summary_text(record),
            at: record.created_at,
        };
        if let Err(e) = self
            .summaries
            .set_last_message(&key, record.sender_id, &last)
            .await
        {
            tracing::warn!(record_id = record.id, error = %e, "Summary update failed");
        }

        if let Err(e) = self.sessions.touch(record.sender_id, &key).await {
            tracing::warn!(user_id = record.sender_id, error = %e, "Session touch failed");
        }
        if record.talk_type == TalkType::Direct {
            let receiver_view = ConversationKey::direct(record.sender_id);
            if let Err(e) = self
                .sessions
                .touch(record.receiver_id, &receiver_view)
                .await
            {
                tracing::warn!(user_id = record.receiver_id, error = %e, "Session touch failed");
            }
        }

        let event = FanoutEvent::Message(MessagePush::from_record(record));
        if let Err(e) = self.publisher.publish(&event).await {
            // Fan-out loss is never surfaced: offline recipients recover
            // from persisted history on their next session-list fetch.
            tracing::warn!(record_id = record.id, error = %e, "Message fan-out failed");
        }
    }

    /// Every participant other than the sender.
    async fn recipients(&self, record: &TalkRecord) -> Vec<i64> {
        match record.talk_type {
            TalkType::Direct => vec![record.receiver_id],
            TalkType::Group => match self.groups.member_ids(record.receiver_id).await {
                Ok(ids) => ids.into_iter().filter(|id| *id != record.sender_id).collect(),
                Err(e) => {
                    tracing::warn!(group_id = record.receiver_id, error = %e,
                        "Member lookup for unread tracking failed");
                    Vec::new()
                }
            },
        }
    }
}

/// Snippet shown in conversation lists: clipped text for text messages, a
/// bracketed placeholder for media and system payloads.
fn summary_text(record: &TalkRecord) -> String {
    match record.msg_type.summary_placeholder() {
        Some(placeholder) => placeholder.to_string(),
        None => record.content.chars().take(SUMMARY_CLIP_CHARS).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use crate::domain::entities::{
        Group, GroupMember, GroupRole, MockGroupRepository, MockMessageRepository,
        MockSessionRepository, MockUserRepository,
    };
    use crate::domain::events::MockFanoutPublisher;
    use crate::domain::stores::{MockSequenceStore, MockSummaryStore, MockUnreadStore};

    struct Mocks {
        messages: MockMessageRepository,
        sessions: MockSessionRepository,
        groups: MockGroupRepository,
        users: MockUserRepository,
        sequences: MockSequenceStore,
        unread: MockUnreadStore,
        summaries: MockSummaryStore,
        publisher: MockFanoutPublisher,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                messages: MockMessageRepository::new(),
                sessions: MockSessionRepository::new(),
                groups: MockGroupRepository::new(),
                users: MockUserRepository::new(),
                sequences: MockSequenceStore::new(),
                unread: MockUnreadStore::new(),
                summaries: MockSummaryStore::new(),
                publisher: MockFanoutPublisher::new(),
            }
        }

        fn into_service(self) -> ChatService {
            ChatService::new(
                Arc::new(self.messages),
                Arc::new(self.sessions),
                Arc::new(self.groups),
                Arc::new(self.users),
                Arc::new(self.sequences),
                Arc::new(self.unread),
                Arc::new(self.summaries),
                Arc::new(self.publisher),
            )
        }
    }

    fn group(id: i64, is_dismiss: bool, is_mute: bool) -> Group {
        Group {
            id,
            name: "test group".into(),
            avatar: String::new(),
            owner_id: 1,
            is_dismiss,
            is_mute,
            created_at: Utc::now(),
        }
    }

    fn member(group_id: i64, user_id: i64, role: GroupRole, is_quit: bool, is_mute: bool) -> GroupMember {
        GroupMember {
            id: user_id,
            group_id,
            user_id,
            role,
            is_quit,
            is_mute,
            created_at: Utc::now(),
        }
    }

    fn persisted(new: &NewTalkRecord, id: i64) -> TalkRecord {
        TalkRecord {
            id,
            msg_type: new.msg_type,
            talk_type: new.talk_type,
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            sequence: new.sequence,
            content: new.content.clone(),
            is_revoked: false,
            created_at: new.created_at,
        }
    }

    #[tokio::test]
    async fn group_send_updates_unread_summary_and_publishes() {
        let mut mocks = Mocks::new();
        let key = ConversationKey::group(42);

        mocks
            .groups
            .expect_find_by_id()
            .with(eq(42))
            .returning(|id| Ok(Some(group(id, false, false))));
        mocks
            .groups
            .expect_find_member()
            .with(eq(42), eq(1))
            .returning(|g, u| Ok(Some(member(g, u, GroupRole::Member, false, false))));
        mocks
            .groups
            .expect_member_ids()
            .with(eq(42))
            .returning(|_| Ok(vec![1, 2, 3]));
        mocks
            .sequences
            .expect_next()
            .withf(move |k, _| *k == key)
            .times(1)
            .returning(|_, _| Ok(1));
        mocks
            .messages
            .expect_create()
            .times(1)
            .returning(|new| Ok(persisted(new, 7)));
        // Unread goes to B and C, never back to the sender.
        mocks
            .unread
            .expect_increment()
            .withf(move |user_id, k| (*user_id == 2 || *user_id == 3) && *k == key)
            .times(2)
            .returning(|_, _| Ok(1));
        mocks
            .summaries
            .expect_set_last_message()
            .withf(move |k, _, last| *k == key && last.text == "hi")
            .times(1)
            .returning(|_, _, _| Ok(()));
        mocks
            .sessions
            .expect_touch()
            .with(eq(1), eq(key))
            .times(1)
            .returning(|_, _| Ok(()));
        mocks
            .publisher
            .expect_publish()
            .withf(|event| matches!(event, FanoutEvent::Message(p) if p.record.sequence == 1))
            .times(1)
            .returning(|_| Ok(()));

        let service = mocks.into_service();
        let record = service
            .send_message(1, key, MessageType::Text, "hi".into())
            .await
            .unwrap();

        assert_eq!(record.sequence, 1);
        assert_eq!(record.id, 7);
    }

    #[tokio::test]
    async fn non_member_send_is_rejected_without_consuming_a_sequence() {
        let mut mocks = Mocks::new();

        mocks
            .groups
            .expect_find_by_id()
            .returning(|id| Ok(Some(group(id, false, false))));
        mocks
            .groups
            .expect_find_member()
            .with(eq(42), eq(99))
            .returning(|_, _| Ok(None));
        // No expectations on sequences/messages/unread/publisher: any call
        // would panic the mock.

        let service = mocks.into_service();
        let err = service
            .send_message(99, ConversationKey::group(42), MessageType::Text, "hi".into())
            .await
            .unwrap_err();

        assert!(matches!(err, SendError::NotMember));
    }

    #[test_case(GroupRole::Member, false, true, false => matches SendError::Muted ; "gagged member is rejected")]
    #[test_case(GroupRole::Member, true, false, false => matches SendError::NotMember ; "quit member is not a member")]
    #[test_case(GroupRole::Member, false, false, true => matches SendError::Muted ; "all mute silences plain members")]
    #[tokio::test]
    async fn group_permission_matrix(
        role: GroupRole,
        is_quit: bool,
        member_mute: bool,
        group_mute: bool,
    ) -> SendError {
        let mut mocks = Mocks::new();

        mocks
            .groups
            .expect_find_by_id()
            .returning(move |id| Ok(Some(group(id, false, group_mute))));
        mocks
            .groups
            .expect_find_member()
            .returning(move |g, u| Ok(Some(member(g, u, role, is_quit, member_mute))));

        let service = mocks.into_service();
        service
            .send_message(5, ConversationKey::group(42), MessageType::Text, "hi".into())
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn owner_may_speak_through_all_mute() {
        let mut mocks = Mocks::new();
        let key = ConversationKey::group(42);

        mocks
            .groups
            .expect_find_by_id()
            .returning(|id| Ok(Some(group(id, false, true))));
        mocks
            .groups
            .expect_find_member()
            .returning(|g, u| Ok(Some(member(g, u, GroupRole::Owner, false, false))));
        mocks.groups.expect_member_ids().returning(|_| Ok(vec![1]));
        mocks.sequences.expect_next().returning(|_, _| Ok(5));
        mocks
            .messages
            .expect_create()
            .returning(|new| Ok(persisted(new, 8)));
        mocks
            .summaries
            .expect_set_last_message()
            .returning(|_, _, _| Ok(()));
        mocks.sessions.expect_touch().returning(|_, _| Ok(()));
        mocks.publisher.expect_publish().returning(|_| Ok(()));

        let service = mocks.into_service();
        let record = service
            .send_message(1, key, MessageType::Text, "announcement".into())
            .await
            .unwrap();
        assert_eq!(record.sequence, 5);
    }

    #[tokio::test]
    async fn direct_send_increments_receiver_unread_under_sender_key() {
        let mut mocks = Mocks::new();
        let key = ConversationKey::direct(9);

        mocks.users.expect_exists().with(eq(9)).returning(|_| Ok(true));
        mocks.sequences.expect_next().returning(|_, _| Ok(3));
        mocks
            .messages
            .expect_create()
            .returning(|new| Ok(persisted(new, 11)));
        // Receiver 9 sees the conversation keyed by the sender, user 4.
        mocks
            .unread
            .expect_increment()
            .with(eq(9), eq(ConversationKey::direct(4)))
            .times(1)
            .returning(|_, _| Ok(1));
        mocks
            .summaries
            .expect_set_last_message()
            .returning(|_, _, _| Ok(()));
        mocks
            .sessions
            .expect_touch()
            .with(eq(4), eq(key))
            .times(1)
            .returning(|_, _| Ok(()));
        mocks
            .sessions
            .expect_touch()
            .with(eq(9), eq(ConversationKey::direct(4)))
            .times(1)
            .returning(|_, _| Ok(()));
        mocks.publisher.expect_publish().returning(|_| Ok(()));

        let service = mocks.into_service();
        service
            .send_message(4, key, MessageType::Text, "hello".into())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn persist_failure_fails_the_send_and_skips_the_tail() {
        let mut mocks = Mocks::new();

        mocks.users.expect_exists().returning(|_| Ok(true));
        // The sequence is reserved before the insert; the failed insert
        // leaves it permanently skipped.
        mocks.sequences.expect_next().times(1).returning(|_, _| Ok(12));
        mocks.messages.expect_create().returning(|_| {
            Err(AppError::Internal("insert failed".into()))
        });
        // No unread/summary/publish expectations: the tail must not run.

        let service = mocks.into_service();
        let err = service
            .send_message(4, ConversationKey::direct(9), MessageType::Text, "hi".into())
            .await
            .unwrap_err();

        assert!(matches!(err, SendError::Storage(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn cache_failures_after_persist_do_not_fail_the_send() {
        let mut mocks = Mocks::new();

        mocks.users.expect_exists().returning(|_| Ok(true));
        mocks.sequences.expect_next().returning(|_, _| Ok(1));
        mocks
            .messages
            .expect_create()
            .returning(|new| Ok(persisted(new, 2)));
        mocks
            .unread
            .expect_increment()
            .returning(|_, _| Err(AppError::Internal("redis down".into())));
        mocks
            .summaries
            .expect_set_last_message()
            .returning(|_, _, _| Err(AppError::Internal("redis down".into())));
        mocks
            .sessions
            .expect_touch()
            .returning(|_, _| Err(AppError::Internal("db hiccup".into())));
        mocks
            .publisher
            .expect_publish()
            .returning(|_| Err(AppError::Internal("bus down".into())));

        let service = mocks.into_service();
        let record = service
            .send_message(4, ConversationKey::direct(9), MessageType::Image, "{}".into())
            .await
            .unwrap();

        assert_eq!(record.id, 2);
    }

    #[tokio::test]
    async fn revoke_is_author_only() {
        let mut mocks = Mocks::new();
        let key = ConversationKey::group(42);

        mocks.messages.expect_find_by_id().with(eq(7)).returning(move |id| {
            Ok(Some(TalkRecord {
                id,
                msg_type: MessageType::Text,
                talk_type: TalkType::Group,
                sender_id: 1,
                receiver_id: 42,
                sequence: 1,
                content: "hi".into(),
                is_revoked: false,
                created_at: Utc::now(),
            }))
        });

        let service = mocks.into_service();
        let err = service.revoke_message(2, key, 7).await.unwrap_err();
        assert!(matches!(err, SendError::NotAuthor));
    }

    #[tokio::test]
    async fn revoke_marks_record_and_publishes() {
        let mut mocks = Mocks::new();
        let key = ConversationKey::group(42);

        mocks.messages.expect_find_by_id().returning(move |id| {
            Ok(Some(TalkRecord {
                id,
                msg_type: MessageType::Text,
                talk_type: TalkType::Group,
                sender_id: 1,
                receiver_id: 42,
                sequence: 1,
                content: "hi".into(),
                is_revoked: false,
                created_at: Utc::now(),
            }))
        });
        mocks
            .messages
            .expect_mark_revoked()
            .with(eq(7))
            .times(1)
            .returning(|_| Ok(()));
        mocks
            .publisher
            .expect_publish()
            .withf(|event| {
                matches!(event, FanoutEvent::MessageRevoke(p) if p.record_id == 7)
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = mocks.into_service();
        service.revoke_message(1, key, 7).await.unwrap();
    }

    #[test]
    fn summary_text_clips_and_substitutes_placeholders() {
        let mut record = TalkRecord {
            id: 1,
            msg_type: MessageType::Text,
            talk_type: TalkType::Direct,
            sender_id: 1,
            receiver_id: 2,
            sequence: 1,
            content: "x".repeat(100),
            is_revoked: false,
            created_at: Utc::now(),
        };
        assert_eq!(summary_text(&record).chars().count(), SUMMARY_CLIP_CHARS);

        record.msg_type = MessageType::Voice;
        assert_eq!(summary_text(&record), "[Voice]");
    }
}
