//! Fan-out domain events.
//!
//! Every domain occurrence that must reach connected clients is published
//! once as a [`FanoutEvent`] on the shared pub/sub topic. Delivery is
//! at-most-once per process: an event published while no subscriber listens
//! is lost, and clients reconcile from persisted history on reconnect. Do
//! not upgrade this to a guaranteed-delivery queue without a design change.
//!
//! The wire envelope is `{"event": string, "data": string(JSON)}`. Unknown
//! event names decode into [`FanoutEvent::Unknown`] and are ignored by
//! consumers, which keeps the topic forward compatible.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::TalkRecord;
use crate::domain::value_objects::{MessageType, TalkType};
use crate::shared::error::AppError;

pub const EVENT_MESSAGE: &str = "im_message";
pub const EVENT_MESSAGE_REVOKE: &str = "im_message_revoke";
pub const EVENT_CONTACT_STATUS: &str = "im_contact_status";
pub const EVENT_GROUP_JOIN: &str = "im_group_join";
pub const EVENT_GROUP_APPLY: &str = "im_group_apply";

/// Message body as pushed to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBody {
    pub record_id: i64,
    pub msg_type: MessageType,
    pub sequence: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A new message was persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePush {
    pub talk_type: TalkType,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub record: MessageBody,
}

impl MessagePush {
    pub fn from_record(record: &TalkRecord) -> Self {
        Self {
            talk_type: record.talk_type,
            sender_id: record.sender_id,
            receiver_id: record.receiver_id,
            record: MessageBody {
                record_id: record.id,
                msg_type: record.msg_type,
                sequence: record.sequence,
                content: record.content.clone(),
                created_at: record.created_at,
            },
        }
    }
}

/// A message was revoked by its author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokePush {
    pub talk_type: TalkType,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub record_id: i64,
}

/// A user's presence on a channel changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactStatusPush {
    pub user_id: i64,
    pub channel: String,
    pub is_online: bool,
}

/// Users joined a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupJoinPush {
    pub group_id: i64,
    pub user_ids: Vec<i64>,
}

/// A user applied to join a group; routed to its admins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupApplyPush {
    pub group_id: i64,
    pub applicant_id: i64,
}

/// Union of every event carried on the fan-out topic.
#[derive(Debug, Clone)]
pub enum FanoutEvent {
    Message(MessagePush),
    MessageRevoke(RevokePush),
    ContactStatus(ContactStatusPush),
    GroupJoin(GroupJoinPush),
    GroupApply(GroupApplyPush),
    /// An event name this build does not know. Kept with its raw payload so
    /// consumers can skip it without failing the stream.
    Unknown { event: String, data: String },
}

/// Wire envelope: the payload travels as a JSON-encoded string.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    event: String,
    data: String,
}

impl FanoutEvent {
    /// Event name used in the wire envelope and in push frames.
    pub fn event_name(&self) -> &str {
        match self {
            FanoutEvent::Message(_) => EVENT_MESSAGE,
            FanoutEvent::MessageRevoke(_) => EVENT_MESSAGE_REVOKE,
            FanoutEvent::ContactStatus(_) => EVENT_CONTACT_STATUS,
            FanoutEvent::GroupJoin(_) => EVENT_GROUP_JOIN,
            FanoutEvent::GroupApply(_) => EVENT_GROUP_APPLY,
            FanoutEvent::Unknown { event, .. } => event,
        }
    }

    /// Payload as a JSON value, for embedding in push frames.
    pub fn payload_json(&self) -> serde_json::Value {
        match self {
            FanoutEvent::Message(p) => serde_json::to_value(p).unwrap_or_default(),
            FanoutEvent::MessageRevoke(p) => serde_json::to_value(p).unwrap_or_default(),
            FanoutEvent::ContactStatus(p) => serde_json::to_value(p).unwrap_or_default(),
            FanoutEvent::GroupJoin(p) => serde_json::to_value(p).unwrap_or_default(),
            FanoutEvent::GroupApply(p) => serde_json::to_value(p).unwrap_or_default(),
            FanoutEvent::Unknown { data, .. } => {
                serde_json::from_str(data).unwrap_or_default()
            }
        }
    }

    /// Encode into the wire envelope.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let data = match self {
            FanoutEvent::Message(p) => serde_json::to_string(p)?,
            FanoutEvent::MessageRevoke(p) => serde_json::to_string(p)?,
            FanoutEvent::ContactStatus(p) => serde_json::to_string(p)?,
            FanoutEvent::GroupJoin(p) => serde_json::to_string(p)?,
            FanoutEvent::GroupApply(p) => serde_json::to_string(p)?,
            FanoutEvent::Unknown { data, .. } => data.clone(),
        };
        serde_json::to_string(&Envelope {
            event: self.event_name().to_string(),
            data,
        })
    }

    /// Decode a wire envelope. Unrecognized event names yield
    /// [`FanoutEvent::Unknown`] rather than an error.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        Ok(match envelope.event.as_str() {
            EVENT_MESSAGE => FanoutEvent::Message(serde_json::from_str(&envelope.data)?),
            EVENT_MESSAGE_REVOKE => {
                FanoutEvent::MessageRevoke(serde_json::from_str(&envelope.data)?)
            }
            EVENT_CONTACT_STATUS => {
                FanoutEvent::ContactStatus(serde_json::from_str(&envelope.data)?)
            }
            EVENT_GROUP_JOIN => FanoutEvent::GroupJoin(serde_json::from_str(&envelope.data)?),
            EVENT_GROUP_APPLY => FanoutEvent::GroupApply(serde_json::from_str(&envelope.data)?),
            _ => FanoutEvent::Unknown {
                event: envelope.event,
                data: envelope.data,
            },
        })
    }
}

/// Publisher side of the fan-out bridge.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FanoutPublisher: Send + Sync {
    /// Publish one event to the shared topic. Zero listening subscribers is
    /// not an error; the event is simply lost.
    async fn publish(&self, event: &FanoutEvent) -> Result<(), AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn envelope_round_trip_for_message_events() {
        let event = FanoutEvent::Message(MessagePush {
            talk_type: TalkType::Group,
            sender_id: 1,
            receiver_id: 42,
            record: MessageBody {
                record_id: 7,
                msg_type: MessageType::Text,
                sequence: 3,
                content: "hi".into(),
                created_at: Utc::now(),
            },
        });

        let raw = event.encode().unwrap();
        // Envelope data is a JSON string, not a nested object.
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["event"], EVENT_MESSAGE);
        assert!(value["data"].is_string());

        match FanoutEvent::decode(&raw).unwrap() {
            FanoutEvent::Message(p) => {
                assert_eq!(p.record.record_id, 7);
                assert_eq!(p.record.sequence, 3);
                assert_eq!(p.receiver_id, 42);
            }
            other => panic!("decoded wrong variant: {:?}", other),
        }
    }

    #[test]
    fn unknown_events_survive_decode_and_reencode() {
        let raw = r#"{"event":"im_future_thing","data":"{\"x\":1}"}"#;
        let event = FanoutEvent::decode(raw).unwrap();
        match &event {
            FanoutEvent::Unknown { event, data } => {
                assert_eq!(event, "im_future_thing");
                assert_eq!(data, "{\"x\":1}");
            }
            other => panic!("decoded wrong variant: {:?}", other),
        }
        // Re-encoding keeps the original payload byte-for-byte.
        let reencoded = event.encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&reencoded).unwrap();
        assert_eq!(value["event"], "im_future_thing");
        assert_eq!(value["data"], "{\"x\":1}");
    }
}
