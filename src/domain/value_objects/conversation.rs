//! Conversation identity and message-kind enums.
//!
//! A conversation is identified by `(talk_type, receiver_id)`. Direct and
//! group conversations can never collide because the talk type is part of
//! the key.

use serde::{Deserialize, Serialize};

/// Conversation kind, stored as SMALLINT and carried on the wire as an
/// integer (`1` = direct, `2` = group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum TalkType {
    /// One-to-one conversation; `receiver_id` is the counterpart user
    Direct,
    /// Group conversation; `receiver_id` is the group id
    Group,
}

impl TalkType {
    pub fn as_i16(self) -> i16 {
        match self {
            TalkType::Direct => 1,
            TalkType::Group => 2,
        }
    }
}

impl TryFrom<i16> for TalkType {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TalkType::Direct),
            2 => Ok(TalkType::Group),
            other => Err(format!("invalid talk_type: {}", other)),
        }
    }
}

impl From<TalkType> for i16 {
    fn from(value: TalkType) -> Self {
        value.as_i16()
    }
}

/// Message kind, stored as SMALLINT in the `talk_records` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "i16", into = "i16")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Voice,
    Video,
    File,
    System,
}

impl MessageType {
    pub fn as_i16(self) -> i16 {
        match self {
            MessageType::Text => 1,
            MessageType::Image => 2,
            MessageType::Voice => 3,
            MessageType::Video => 4,
            MessageType::File => 5,
            MessageType::System => 6,
        }
    }

    /// Placeholder text shown in conversation lists for non-text payloads.
    pub fn summary_placeholder(self) -> Option<&'static str> {
        match self {
            MessageType::Text => None,
            MessageType::Image => Some("[Image]"),
            MessageType::Voice => Some("[Voice]"),
            MessageType::Video => Some("[Video]"),
            MessageType::File => Some("[File]"),
            MessageType::System => Some("[System]"),
        }
    }
}

impl TryFrom<i16> for MessageType {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::Text),
            2 => Ok(MessageType::Image),
            3 => Ok(MessageType::Voice),
            4 => Ok(MessageType::Video),
            5 => Ok(MessageType::File),
            6 => Ok(MessageType::System),
            other => Err(format!("invalid msg_type: {}", other)),
        }
    }
}

impl From<MessageType> for i16 {
    fn from(value: MessageType) -> Self {
        value.as_i16()
    }
}

/// Identifies a conversation from one participant's point of view.
///
/// For direct conversations `receiver_id` is the counterpart user, so the
/// same two-party conversation is `(Direct, B)` for user A and `(Direct, A)`
/// for user B. Shared storage (sequence counters, summaries) uses the
/// canonical form from [`ConversationKey::canonical_suffix`] so both views
/// land on one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub talk_type: TalkType,
    pub receiver_id: i64,
}

impl ConversationKey {
    pub fn direct(receiver_id: i64) -> Self {
        Self {
            talk_type: TalkType::Direct,
            receiver_id,
        }
    }

    pub fn group(group_id: i64) -> Self {
        Self {
            talk_type: TalkType::Group,
            receiver_id: group_id,
        }
    }

    /// Canonical storage suffix shared by every participant of the
    /// conversation. Direct conversations use the sorted user-id pair so
    /// both directions resolve to the same counter and summary; groups use
    /// the group id.
    pub fn canonical_suffix(&self, viewer_id: i64) -> String {
        match self.talk_type {
            TalkType::Direct => {
                let (lo, hi) = if viewer_id <= self.receiver_id {
                    (viewer_id, self.receiver_id)
                } else {
                    (self.receiver_id, viewer_id)
                };
                format!("1_{}_{}", lo, hi)
            }
            TalkType::Group => format!("2_{}", self.receiver_id),
        }
    }

    /// Viewer-relative hash field, `"{talk_type}_{receiver_id}"`. Used for
    /// per-user unread hashes where the key is already scoped to one viewer.
    pub fn as_field(&self) -> String {
        format!("{}_{}", self.talk_type.as_i16(), self.receiver_id)
    }

    /// Parse a viewer-relative hash field back into a key.
    pub fn from_field(field: &str) -> Option<Self> {
        let (talk_type, receiver_id) = field.split_once('_')?;
        let talk_type = TalkType::try_from(talk_type.parse::<i16>().ok()?).ok()?;
        let receiver_id = receiver_id.parse().ok()?;
        Some(Self {
            talk_type,
            receiver_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn talk_type_round_trips_through_wire_integers() {
        let json = serde_json::to_string(&TalkType::Group).unwrap();
        assert_eq!(json, "2");
        let parsed: TalkType = serde_json::from_str("1").unwrap();
        assert_eq!(parsed, TalkType::Direct);
        assert!(serde_json::from_str::<TalkType>("3").is_err());
    }

    #[test]
    fn canonical_suffix_is_shared_by_both_direct_views() {
        let a_view = ConversationKey::direct(42);
        let b_view = ConversationKey::direct(7);
        assert_eq!(a_view.canonical_suffix(7), b_view.canonical_suffix(42));
        assert_eq!(a_view.canonical_suffix(7), "1_7_42");
    }

    #[test]
    fn group_suffix_ignores_viewer() {
        let key = ConversationKey::group(42);
        assert_eq!(key.canonical_suffix(1), key.canonical_suffix(99));
        assert_eq!(key.canonical_suffix(1), "2_42");
    }

    #[test]
    fn field_round_trip() {
        let key = ConversationKey::group(42);
        assert_eq!(ConversationKey::from_field(&key.as_field()), Some(key));
        assert_eq!(ConversationKey::from_field("nonsense"), None);
        assert_eq!(ConversationKey::from_field("9_1"), None);
    }
}
