//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and hands the socket to a
//! [`Connection`](super::connection::Connection).

use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::StreamExt;
use serde::Deserialize;
use std::sync::Arc;

use super::connection::{serve_connection, ConnectionSettings};
use super::hub::HubHandle;
use crate::api::AppState;

/// Query parameters of `GET /ws`
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Identity the client also sends as `x-ws-client-id` on mutations
    #[serde(default)]
    pub client_id: String,
}

/// WebSocket upgrade handler
///
/// Upgrades the request and serves the connection until it closes. A failed
/// upgrade only affects this request.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let hub = state.hub.clone();
    let settings = state.ws_settings.clone();

    ws.max_message_size(settings.max_message_size)
        .on_failed_upgrade(|e| {
            tracing::warn!(error = %e, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| handle_socket(socket, hub, params.client_id, settings))
}

/// Serve an established WebSocket
async fn handle_socket(
    socket: WebSocket,
    hub: HubHandle,
    client_id: String,
    settings: ConnectionSettings,
) {
    let (sender, receiver) = socket.split();
    let reason = serve_connection(hub, client_id.clone(), sender, receiver, settings).await;

    tracing::debug!(client_id = %client_id, reason = ?reason, "WebSocket session ended");
}
