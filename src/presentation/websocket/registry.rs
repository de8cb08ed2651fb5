//! Connection Registry
//!
//! Tracks live WebSocket connections per (channel, user). The registry is a
//! capability-scoped component passed by reference to the dispatcher and
//! the fan-out bridge, never a package-level singleton, so tests can run
//! isolated instances.
//!
//! Concurrency model: state is a channel map of per-user buckets built on
//! `DashMap`, so unrelated users' connects and disconnects never contend on
//! one lock. Delivery uses each connection's bounded outbound buffer via
//! `try_send`; a full buffer marks the connection as a slow consumer and
//! closes it instead of blocking the sender.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use super::frames::ServerFrame;

/// One live WebSocket connection.
///
/// Owned by the registry for the connection's lifetime and never
/// serialized. Holds the sending half of the outbound buffer; the socket
/// task drains the receiving half.
pub struct Connection {
    id: Uuid,
    user_id: i64,
    channel: String,
    outbound: mpsc::Sender<ServerFrame>,
    closed: AtomicBool,
    close_signal: Notify,
}

impl Connection {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Enqueue a frame onto the outbound buffer without blocking.
    ///
    /// Returns false if the connection is closed or its buffer is full; a
    /// full buffer closes the connection (slow-consumer eviction).
    pub fn enqueue(&self, frame: ServerFrame) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        match self.outbound.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    user_id = self.user_id,
                    connection_id = %self.id,
                    "Outbound buffer full, closing slow connection"
                );
                self.close();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.close();
                false
            }
        }
    }

    /// Request the socket task to tear this connection down. Idempotent and
    /// callable from any task (eviction, slow-consumer handling).
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.close_signal.notify_one();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once [`Connection::close`] has been called. The permit
    /// stored by `notify_one` makes this safe against a close that lands
    /// before the await.
    pub async fn closed(&self) {
        if self.is_closed() {
            return;
        }
        self.close_signal.notified().await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("channel", &self.channel)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Result of registering a connection.
pub struct Registration {
    pub connection: Arc<Connection>,
    /// Receiving half of the outbound buffer; drained by the socket's
    /// writer task.
    pub outbound: mpsc::Receiver<ServerFrame>,
    /// Whether this is the user's first live connection on the channel.
    /// Drives presence transitions.
    pub first_for_user: bool,
}

/// Registry of live connections, keyed by channel then user id.
pub struct ConnectionRegistry {
    channels: DashMap<String, DashMap<i64, Vec<Arc<Connection>>>>,
    outbound_capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(outbound_capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            outbound_capacity: outbound_capacity.max(1),
        }
    }

    /// Register a new connection for a user. A user may hold several
    /// simultaneous connections (multi-device).
    pub fn register(&self, channel: &str, user_id: i64) -> Registration {
        let (tx, rx) = mpsc::channel(self.outbound_capacity);
        let connection = Arc::new(Connection {
            id: Uuid::new_v4(),
            user_id,
            channel: channel.to_string(),
            outbound: tx,
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        });

        let bucket = self
            .channels
            .entry(channel.to_string())
            .or_default();
        let mut user_connections = bucket.entry(user_id).or_default();
        let first_for_user = user_connections.is_empty();
        user_connections.push(connection.clone());
        drop(user_connections);
        drop(bucket);

        tracing::info!(
            user_id,
            channel,
            connection_id = %connection.id,
            "Connection registered"
        );

        Registration {
            connection,
            outbound: rx,
            first_for_user,
        }
    }

    /// Remove a connection. Idempotent: safe to call from both the
    /// connection-close path and explicit eviction. Returns true when this
    /// removed the user's last connection on the channel.
    pub fn unregister(&self, connection: &Connection) -> bool {
        connection.close();

        let Some(bucket) = self.channels.get(connection.channel()) else {
            return false;
        };

        let mut was_last = false;
        if let Some(mut user_connections) = bucket.get_mut(&connection.user_id()) {
            let before = user_connections.len();
            user_connections.retain(|c| c.id() != connection.id());
            let removed = user_connections.len() != before;
            was_last = removed && user_connections.is_empty();
            if removed {
                tracing::info!(
                    user_id = connection.user_id(),
                    channel = connection.channel(),
                    connection_id = %connection.id(),
                    "Connection unregistered"
                );
            }
        }
        if was_last {
            bucket.remove_if(&connection.user_id(), |_, connections| connections.is_empty());
        }

        was_last
    }

    /// Live connection count on one channel.
    pub fn count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|bucket| bucket.iter().map(|entry| entry.value().len()).sum())
            .unwrap_or(0)
    }

    /// Live connection counts for every channel, for diagnostics.
    pub fn channel_counts(&self) -> Vec<(String, usize)> {
        self.channels
            .iter()
            .map(|entry| {
                let count = entry.value().iter().map(|e| e.value().len()).sum();
                (entry.key().clone(), count)
            })
            .collect()
    }

    /// Whether a user has at least one live connection on the channel.
    pub fn is_user_online(&self, channel: &str, user_id: i64) -> bool {
        self.channels
            .get(channel)
            .and_then(|bucket| {
                bucket
                    .get(&user_id)
                    .map(|connections| !connections.is_empty())
            })
            .unwrap_or(false)
    }

    /// Enqueue an event onto every live connection the user holds on this
    /// process. Returns true if at least one connection accepted it.
    pub fn send_local(&self, channel: &str, user_id: i64, frame: &ServerFrame) -> bool {
        let Some(bucket) = self.channels.get(channel) else {
            return false;
        };
        let Some(connections) = bucket.get(&user_id) else {
            return false;
        };

        let mut delivered = false;
        for connection in connections.iter() {
            if connection.enqueue(frame.clone()) {
                delivered = true;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame(event: &str) -> ServerFrame {
        ServerFrame::new(event, serde_json::Value::Null)
    }

    #[tokio::test]
    async fn multi_device_registration_and_counts() {
        let registry = ConnectionRegistry::new(10);

        let first = registry.register("chat", 1);
        let second = registry.register("chat", 1);
        let other = registry.register("chat", 2);

        assert!(first.first_for_user);
        assert!(!second.first_for_user);
        assert!(other.first_for_user);
        assert_eq!(registry.count("chat"), 3);
        assert_eq!(registry.count("missing"), 0);
        assert!(registry.is_user_online("chat", 1));
    }

    #[tokio::test]
    async fn send_local_reaches_every_device_of_the_user() {
        let registry = ConnectionRegistry::new(10);

        let mut a1 = registry.register("chat", 1);
        let mut a2 = registry.register("chat", 1);
        let mut b = registry.register("chat", 2);

        assert!(registry.send_local("chat", 1, &frame("im_message")));

        assert_eq!(a1.outbound.recv().await.unwrap().event, "im_message");
        assert_eq!(a2.outbound.recv().await.unwrap().event, "im_message");
        assert!(b.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_local_without_connections_reports_undelivered() {
        let registry = ConnectionRegistry::new(10);
        assert!(!registry.send_local("chat", 42, &frame("im_message")));
    }

    #[tokio::test]
    async fn unregister_is_idempotent_and_tracks_the_last_connection() {
        let registry = ConnectionRegistry::new(10);

        let first = registry.register("chat", 1);
        let second = registry.register("chat", 1);

        assert!(!registry.unregister(&first.connection));
        assert_eq!(registry.count("chat"), 1);

        // Second call for the same connection is a no-op.
        assert!(!registry.unregister(&first.connection));
        assert_eq!(registry.count("chat"), 1);

        assert!(registry.unregister(&second.connection));
        assert_eq!(registry.count("chat"), 0);
        assert!(!registry.is_user_online("chat", 1));
    }

    #[tokio::test]
    async fn full_outbound_buffer_closes_the_connection_instead_of_blocking() {
        let registry = ConnectionRegistry::new(2);

        let registration = registry.register("chat", 1);
        let connection = registration.connection.clone();

        assert!(connection.enqueue(frame("one")));
        assert!(connection.enqueue(frame("two")));
        // Buffer is full: the third frame is dropped and the connection is
        // marked closed for the socket task to tear down.
        assert!(!connection.enqueue(frame("three")));
        assert!(connection.is_closed());

        // The close signal is observable even though it fired before the
        // await.
        connection.closed().await;

        // Subsequent sends to the closed connection are rejected outright.
        assert!(!registry.send_local("chat", 1, &frame("four")));
    }

    #[tokio::test]
    async fn eviction_wakes_the_waiting_socket_task() {
        let registry = ConnectionRegistry::new(4);
        let registration = registry.register("chat", 7);
        let connection = registration.connection.clone();

        let waiter = tokio::spawn({
            let connection = connection.clone();
            async move {
                connection.closed().await;
            }
        });

        connection.close();
        waiter.await.unwrap();
        assert!(connection.is_closed());
    }
}
