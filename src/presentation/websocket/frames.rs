//! WebSocket Frame Types
//!
//! Inbound frames are tagged JSON objects carrying a conversation address;
//! outbound frames are `{event, data}` envelopes.

use serde::{Deserialize, Serialize};

use crate::domain::events::FanoutEvent;
use crate::domain::value_objects::ConversationKey;

/// Inbound client frame.
///
/// The wire shape is `{"type": "...", "receiver": {"talk_type": n,
/// "receiver_id": n}, ...}`. The sender identity never comes from the
/// frame; it is resolved from the authenticated connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Heartbeat; answered with a `pong` event frame
    Ping,
    Text {
        receiver: ConversationKey,
        content: String,
    },
    Image {
        receiver: ConversationKey,
        url: String,
        #[serde(default)]
        width: i32,
        #[serde(default)]
        height: i32,
    },
    Voice {
        receiver: ConversationKey,
        url: String,
        #[serde(default)]
        duration: i32,
    },
    Video {
        receiver: ConversationKey,
        url: String,
        #[serde(default)]
        duration: i32,
        #[serde(default)]
        cover: String,
    },
    File {
        receiver: ConversationKey,
        url: String,
        name: String,
        #[serde(default)]
        size: i64,
    },
    /// Revoke a previously sent record in the addressed conversation
    Revoke {
        receiver: ConversationKey,
        record_id: i64,
    },
}

/// Outbound server frame: `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerFrame {
    pub event: String,
    pub data: serde_json::Value,
}

impl ServerFrame {
    pub fn new(event: &str, data: serde_json::Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }

    /// Heartbeat reply.
    pub fn pong() -> Self {
        Self::new("pong", serde_json::Value::Null)
    }

    /// Error frame reported to the sender only.
    pub fn error(code: u16, message: &str) -> Self {
        Self::new(
            "error",
            serde_json::json!({ "code": code, "message": message }),
        )
    }

    /// Push frame carrying a fan-out event to a client.
    pub fn push(event: &FanoutEvent) -> Self {
        Self::new(event.event_name(), event.payload_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::TalkType;
    use pretty_assertions::assert_eq;

    #[test]
    fn text_frame_decodes_with_wire_receiver_shape() {
        let raw = r#"{"type":"text","content":"hi","receiver":{"talk_type":2,"receiver_id":42}}"#;
        match serde_json::from_str::<ClientFrame>(raw).unwrap() {
            ClientFrame::Text { receiver, content } => {
                assert_eq!(receiver.talk_type, TalkType::Group);
                assert_eq!(receiver.receiver_id, 42);
                assert_eq!(content, "hi");
            }
            other => panic!("decoded wrong frame: {:?}", other),
        }
    }

    #[test]
    fn media_frames_default_optional_dimensions() {
        let raw = r#"{"type":"image","url":"https://cdn/x.png","receiver":{"talk_type":1,"receiver_id":9}}"#;
        match serde_json::from_str::<ClientFrame>(raw).unwrap() {
            ClientFrame::Image { width, height, .. } => {
                assert_eq!((width, height), (0, 0));
            }
            other => panic!("decoded wrong frame: {:?}", other),
        }
    }

    #[test]
    fn unknown_frame_type_is_a_decode_error() {
        let raw = r#"{"type":"telepathy","receiver":{"talk_type":1,"receiver_id":9}}"#;
        assert!(serde_json::from_str::<ClientFrame>(raw).is_err());
    }

    #[test]
    fn invalid_talk_type_is_a_decode_error() {
        let raw = r#"{"type":"text","content":"hi","receiver":{"talk_type":9,"receiver_id":1}}"#;
        assert!(serde_json::from_str::<ClientFrame>(raw).is_err());
    }

    #[test]
    fn error_frame_serializes_to_the_wire_envelope() {
        let frame = ServerFrame::error(40003, "Not a member of this group");
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["event"], "error");
        assert_eq!(value["data"]["code"], 40003);
    }
}
