// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Downstream WebSocket handler (spec §6, §4.7 step 2): one queue per
//! subscriber, bridging `WsHub` deliveries to the socket and inbound
//! subscribe/unsubscribe/update control frames back onto the registry.
//! Shaped after the teacher's `transport::ws::ws_handler`/`handle_ws` pair,
//! with the bridge-managed `client_rx` replaced by a `WsHub` `QueueHandle`.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::debug;

use crate::state::AppState;

/// Inbound control frames a connected client may send to adjust its filters
/// without reconnecting (spec §3: "mutated only by replacing whole
/// filter-sets").
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    UpdateFilters {
        #[serde(default)]
        system_ids: HashSet<u64>,
        #[serde(default)]
        character_ids: HashSet<u64>,
    },
}

/// `GET /ws/subscriber/{subscriber_id}` — upgrades to a WebSocket bound to
/// that subscriber's existing subscription. Rejects unknown subscribers
/// before the upgrade.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Path(subscriber_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let Some(subscription) = state.registry.get_by_subscriber(&subscriber_id).await else {
        return axum::http::Response::builder()
            .status(404)
            .body(axum::body::Body::from("no subscription for this subscriber"))
            .unwrap_or_default()
            .into_response();
    };

    ws.on_upgrade(move |socket| handle_ws(socket, state, subscription.id)).into_response()
}

/// Per-connection loop: forwards `WsHub` deliveries to the socket and applies
/// inbound filter updates to the registry, until the socket closes or
/// shutdown is signaled.
async fn handle_ws(socket: WebSocket, state: Arc<AppState>, subscription_id: String) {
    let handle = state.broadcaster.ws_hub().register(&subscription_id).await;
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            killmail = handle.recv() => {
                let payload = serde_json::json!({
                    "type": "detailed_kill_update",
                    "data": {
                        "solar_system_id": killmail.system_id,
                        "kills": [killmail.as_ref()],
                        "timestamp": crate::time::format_rfc3339(crate::time::now_secs()),
                    },
                });
                let Ok(text) = serde_json::to_string(&payload) else { break };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        apply_client_message(&state, &subscription_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.broadcaster.ws_hub().unregister(&subscription_id).await;
}

async fn apply_client_message(state: &AppState, subscription_id: &str, text: &str) {
    let Ok(message) = serde_json::from_str::<ClientMessage>(text) else {
        debug!(subscription_id, "ignoring malformed websocket control frame");
        return;
    };
    match message {
        ClientMessage::UpdateFilters { system_ids, character_ids } => {
            if let Err(e) = state.registry.update(subscription_id, system_ids, character_ids).await {
                debug!(subscription_id, err = %e, "filter update rejected");
            }
        }
    }
}
