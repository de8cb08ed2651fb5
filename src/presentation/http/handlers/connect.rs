//! Connection Diagnostics Handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::startup::AppState;

/// Live connection counts for one channel.
#[derive(Debug, Serialize)]
pub struct ChannelDetail {
    pub channel: String,
    pub connections: usize,
}

/// Diagnostics: live connection counts per channel on this process.
pub async fn connect_detail(State(state): State<AppState>) -> Json<Vec<ChannelDetail>> {
    let details = state
        .registry
        .channel_counts()
        .into_iter()
        .map(|(channel, connections)| ChannelDetail {
            channel,
            connections,
        })
        .collect();

    Json(details)
}
