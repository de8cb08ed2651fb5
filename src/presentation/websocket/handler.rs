//! WebSocket Connection Handler
//!
//! Upgrades `GET /ws/chat.io` and runs the per-connection socket loop. One
//! task reads inbound frames and feeds the dispatcher; a second task drains
//! the connection's bounded outbound buffer to the socket, so a slow reader
//! never stalls delivery to anyone else.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Extension, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::time::interval;

use crate::domain::stores::CHANNEL_CHAT;
use crate::infrastructure::metrics;
use crate::presentation::middleware::AuthUser;
use crate::startup::AppState;

use super::dispatcher::{ConnectionContext, DispatchOutcome};

/// WebSocket upgrade handler. Auth ran in middleware: the connection is
/// tied to a user before the socket ever opens.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, auth.user_id))
}

/// Run one connection to completion.
async fn handle_socket(socket: WebSocket, state: AppState, user_id: i64) {
    let registration = state.registry.register(CHANNEL_CHAT, user_id);
    let connection = registration.connection.clone();
    let mut outbound = registration.outbound;
    metrics::connection_opened(CHANNEL_CHAT);

    let (mut sink, mut stream) = socket.split();

    // Writer task: drain the bounded outbound buffer to the socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize outbound frame");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut ctx = ConnectionContext::new(user_id, connection.clone());
    state
        .dispatcher
        .on_open(&mut ctx, registration.first_for_user)
        .await;

    tracing::info!(
        user_id,
        connection_id = %connection.id(),
        "User connected"
    );

    let liveness_timeout_ms = state.settings.websocket.liveness_timeout_ms();
    let mut liveness_check = interval(Duration::from_millis(liveness_timeout_ms));
    liveness_check.tick().await; // Skip first immediate tick

    // Reader loop: inbound frames are processed in arrival order, so
    // messages from one connection keep their order. Across connections
    // only the per-conversation sequence orders anything.
    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match state.dispatcher.on_frame(&mut ctx, &text).await {
                            DispatchOutcome::Handled => {}
                            DispatchOutcome::Reply(frame) => {
                                if !connection.enqueue(frame) {
                                    break;
                                }
                            }
                            DispatchOutcome::Close => break,
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(connection_id = %connection.id(), "Connection closed by peer");
                        break;
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // Pong is handled automatically by axum
                    }
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %connection.id(), error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }

            // Forced eviction (duplicate-login policy, slow consumer).
            _ = connection.closed() => {
                tracing::debug!(connection_id = %connection.id(), "Connection evicted");
                break;
            }

            _ = liveness_check.tick() => {
                if !ctx.is_alive(liveness_timeout_ms) {
                    tracing::info!(
                        connection_id = %connection.id(),
                        "Liveness timeout, closing connection"
                    );
                    break;
                }
            }
        }
    }

    // Cleanup. An in-flight send for this connection's last frame has
    // already reached the chat service and is allowed to complete; only
    // further reads are discarded.
    let last_for_user = state.registry.unregister(&connection);
    state.dispatcher.on_close(&mut ctx, last_for_user).await;
    writer.abort();
    metrics::connection_closed(CHANNEL_CHAT);

    tracing::info!(
        user_id,
        connection_id = %connection.id(),
        "User disconnected"
    );
}
