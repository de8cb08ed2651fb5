//! Fan-out Bridge Subscriber
//!
//! The per-process subscriber side of the fan-out bridge: one long-lived
//! task that consumes the shared pub/sub topic, resolves each event's
//! target users, and pushes to locally registered connections through the
//! registry.
//!
//! Delivery is at-most-once per process per event. A process that is down,
//! or a user with no connection registered here, simply misses the event;
//! the client recovers from persisted history on its next session-list
//! fetch. Do not add replay or acknowledgment here without a design change.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use crate::domain::entities::{GroupRepository, SessionRepository};
use crate::domain::events::FanoutEvent;
use crate::domain::stores::CHANNEL_CHAT;
use crate::infrastructure::fanout::CHAT_TOPIC;
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

use super::frames::ServerFrame;
use super::registry::ConnectionRegistry;

/// Maximum delay between resubscription attempts.
const MAX_BACKOFF_SECS: u64 = 30;

/// Consumes the shared topic and forwards events to local connections.
pub struct FanoutSubscriber {
    client: redis::Client,
    registry: Arc<ConnectionRegistry>,
    groups: Arc<dyn GroupRepository>,
    sessions: Arc<dyn SessionRepository>,
}

impl FanoutSubscriber {
    pub fn new(
        client: redis::Client,
        registry: Arc<ConnectionRegistry>,
        groups: Arc<dyn GroupRepository>,
        sessions: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            client,
            registry,
            groups,
            sessions,
        }
    }

    /// Spawn the subscriber loop as a long-lived background task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Subscribe and consume until the stream drops, then resubscribe with
    /// backoff. Events published while resubscribing are lost, which the
    /// at-most-once contract allows.
    async fn run(self) {
        let mut backoff_secs = 1;
        loop {
            match self.consume().await {
                Ok(()) => {
                    tracing::warn!("Fan-out subscription ended, resubscribing");
                    backoff_secs = 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Fan-out subscription failed");
                }
            }
            tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
        }
    }

    async fn consume(&self) -> Result<(), AppError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(CHAT_TOPIC).await?;
        tracing::info!(topic = CHAT_TOPIC, "Subscribed to fan-out topic");

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(error = %e, "Non-text fan-out payload skipped");
                    continue;
                }
            };
            self.dispatch(&payload).await;
        }

        Ok(())
    }

    /// Decode one envelope and push it to every locally connected target.
    async fn dispatch(&self, raw: &str) {
        let event = match FanoutEvent::decode(raw) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable fan-out envelope skipped");
                return;
            }
        };

        if let FanoutEvent::Unknown { event: name, .. } = &event {
            tracing::trace!(event = %name, "Ignoring unknown fan-out event");
            metrics::record_fanout_delivery(name, "ignored");
            return;
        }

        let targets = match self.resolve_targets(&event).await {
            Ok(targets) => targets,
            Err(e) => {
                tracing::warn!(event = event.event_name(), error = %e,
                    "Target resolution failed, event dropped");
                return;
            }
        };

        let frame = ServerFrame::push(&event);
        for user_id in targets {
            let outcome = if self.registry.send_local(CHANNEL_CHAT, user_id, &frame) {
                "delivered"
            } else {
                "offline"
            };
            metrics::record_fanout_delivery(event.event_name(), outcome);
        }
    }

    /// The users an event concerns: both participants for direct messages,
    /// the current member list for group events, admins for join
    /// applications, and direct-session partners for presence updates.
    async fn resolve_targets(&self, event: &FanoutEvent) -> Result<Vec<i64>, AppError> {
        use crate::domain::value_objects::TalkType;

        Ok(match event {
            FanoutEvent::Message(p) => match p.talk_type {
                TalkType::Direct => vec![p.sender_id, p.receiver_id],
                TalkType::Group => self.groups.member_ids(p.receiver_id).await?,
            },
            FanoutEvent::MessageRevoke(p) => match p.talk_type {
                TalkType::Direct => vec![p.sender_id, p.receiver_id],
                TalkType::Group => self.groups.member_ids(p.receiver_id).await?,
            },
            FanoutEvent::ContactStatus(p) => {
                self.sessions.direct_partner_ids(p.user_id).await?
            }
            FanoutEvent::GroupJoin(p) => self.groups.member_ids(p.group_id).await?,
            FanoutEvent::GroupApply(p) => self.groups.admin_ids(p.group_id).await?,
            FanoutEvent::Unknown { .. } => Vec::new(),
        })
    }
}
