//! Protocol Event Dispatcher
//!
//! The state machine driving a single connection's lifecycle. Transition
//! rules live here, away from socket I/O, so they stay auditable and
//! testable in isolation:
//!
//! ```text
//! Connecting --on_open--> Open --on_close--> Closed (terminal)
//! ```
//!
//! While `Open`, each inbound frame is decoded and routed through the chat
//! service. Permission failures answer the sender with an error frame and
//! change no state; malformed frames are fatal to the connection.

use std::sync::Arc;
use std::time::Instant;

use crate::application::services::{ChatService, SendError};
use crate::domain::events::{ContactStatusPush, FanoutEvent, FanoutPublisher};
use crate::domain::stores::{PresenceStore, CHANNEL_CHAT};
use crate::domain::value_objects::{ConversationKey, MessageType};

use super::frames::{ClientFrame, ServerFrame};
use super::registry::Connection;

/// Connection lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Closed,
}

/// Per-connection dispatch state.
///
/// The user id comes from the authenticated upgrade request and is the only
/// sender identity the dispatcher ever trusts.
pub struct ConnectionContext {
    user_id: i64,
    connection: Arc<Connection>,
    phase: ConnectionPhase,
    last_seen: Instant,
}

impl ConnectionContext {
    pub fn new(user_id: i64, connection: Arc<Connection>) -> Self {
        Self {
            user_id,
            connection,
            phase: ConnectionPhase::Connecting,
            last_seen: Instant::now(),
        }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Refresh the liveness deadline.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Whether the connection produced any frame within the timeout.
    pub fn is_alive(&self, timeout_ms: u64) -> bool {
        self.last_seen.elapsed().as_millis() < timeout_ms as u128
    }
}

/// What the socket loop should do after a frame was dispatched.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Frame fully handled; any delivery happens via fan-out
    Handled,
    /// Send this frame back to this connection only
    Reply(ServerFrame),
    /// Fatal: tear the connection down
    Close,
}

/// Drives connection lifecycle transitions and inbound frame handling.
pub struct Dispatcher {
    chat: Arc<ChatService>,
    presence: Arc<dyn PresenceStore>,
    publisher: Arc<dyn FanoutPublisher>,
}

impl Dispatcher {
    pub fn new(
        chat: Arc<ChatService>,
        presence: Arc<dyn PresenceStore>,
        publisher: Arc<dyn FanoutPublisher>,
    ) -> Self {
        Self {
            chat,
            presence,
            publisher,
        }
    }

    /// `Connecting -> Open`. Sets the presence flag and, when this is the
    /// user's first connection on the channel, announces the transition.
    pub async fn on_open(&self, ctx: &mut ConnectionContext, first_for_user: bool) {
        ctx.phase = ConnectionPhase::Open;
        ctx.touch();

        if let Err(e) = self.presence.set_online(CHANNEL_CHAT, ctx.user_id).await {
            tracing::warn!(user_id = ctx.user_id, error = %e, "Presence set failed");
        }
        if first_for_user {
            self.publish_contact_status(ctx.user_id, true).await;
        }
    }

    /// Handle one inbound text frame while `Open`.
    pub async fn on_frame(&self, ctx: &mut ConnectionContext, raw: &str) -> DispatchOutcome {
        if ctx.phase != ConnectionPhase::Open {
            return DispatchOutcome::Close;
        }

        let frame: ClientFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(user_id = ctx.user_id, error = %e, "Malformed frame, closing");
                return DispatchOutcome::Close;
            }
        };

        ctx.touch();

        match frame {
            ClientFrame::Ping => {
                // Keep the presence TTL ahead of the heartbeat cadence.
                if let Err(e) = self.presence.set_online(CHANNEL_CHAT, ctx.user_id).await {
                    tracing::warn!(user_id = ctx.user_id, error = %e, "Presence refresh failed");
                }
                DispatchOutcome::Reply(ServerFrame::pong())
            }

            ClientFrame::Text { receiver, content } => {
                self.send(ctx, receiver, MessageType::Text, content).await
            }

            ClientFrame::Image {
                receiver,
                url,
                width,
                height,
            } => {
                let content =
                    serde_json::json!({ "url": url, "width": width, "height": height })
                        .to_string();
                self.send(ctx, receiver, MessageType::Image, content).await
            }

            ClientFrame::Voice {
                receiver,
                url,
                duration,
            } => {
                let content = serde_json::json!({ "url": url, "duration": duration }).to_string();
                self.send(ctx, receiver, MessageType::Voice, content).await
            }

            ClientFrame::Video {
                receiver,
                url,
                duration,
                cover,
            } => {
                let content =
                    serde_json::json!({ "url": url, "duration": duration, "cover": cover })
                        .to_string();
                self.send(ctx, receiver, MessageType::Video, content).await
            }

            ClientFrame::File {
                receiver,
                url,
                name,
                size,
            } => {
                let content =
                    serde_json::json!({ "url": url, "name": name, "size": size }).to_string();
                self.send(ctx, receiver, MessageType::File, content).await
            }

            ClientFrame::Revoke {
                receiver,
                record_id,
            } => match self.chat.revoke_message(ctx.user_id, receiver, record_id).await {
                Ok(()) => DispatchOutcome::Handled,
                Err(err) => reply_error(ctx.user_id, err),
            },
        }
    }

    /// `Open -> Closed`. Clears presence and announces the transition once
    /// the user's last connection on the channel is gone.
    pub async fn on_close(&self, ctx: &mut ConnectionContext, last_for_user: bool) {
        ctx.phase = ConnectionPhase::Closed;

        if last_for_user {
            if let Err(e) = self.presence.set_offline(CHANNEL_CHAT, ctx.user_id).await {
                tracing::warn!(user_id = ctx.user_id, error = %e, "Presence clear failed");
            }
            self.publish_contact_status(ctx.user_id, false).await;
        }
    }

    async fn send(
        &self,
        ctx: &ConnectionContext,
        key: ConversationKey,
        msg_type: MessageType,
        content: String,
    ) -> DispatchOutcome {
        match self
            .chat
            .send_message(ctx.user_id, key, msg_type, content)
            .await
        {
            // The sender's own devices receive the message through fan-out
            // like every other participant.
            Ok(_) => DispatchOutcome::Handled,
            Err(err) => reply_error(ctx.user_id, err),
        }
    }

    async fn publish_contact_status(&self, user_id: i64, is_online: bool) {
        let event = FanoutEvent::ContactStatus(ContactStatusPush {
            user_id,
            channel: CHANNEL_CHAT.to_string(),
            is_online,
        });
        if let Err(e) = self.publisher.publish(&event).await {
            tracing::warn!(user_id, error = %e, "Contact status fan-out failed");
        }
    }
}

/// Permission and transient failures are reported to the sender only.
fn reply_error(user_id: i64, err: SendError) -> DispatchOutcome {
    tracing::debug!(user_id, code = err.code(), error = %err, "Send rejected");
    DispatchOutcome::Reply(ServerFrame::error(err.code(), &err.to_string()))
}
