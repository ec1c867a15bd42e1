// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport (spec §6), built the same way the teacher
//! assembles its `axum::Router`: one route table, a CORS layer, shared
//! `Arc<AppState>`.

pub mod http;
pub mod ws;


use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Build the axum `Router` with every downstream route from spec §6.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(http::health))
        .route("/api/v1/kills/system/{id}", get(http::kills_by_system))
        .route("/api/v1/kills/systems", post(http::kills_by_systems))
        .route("/api/v1/kills/cached/{id}", get(http::kills_cached))
        .route("/api/v1/killmail/{id}", get(http::killmail_by_id))
        .route("/api/v1/kills/count/{id}", get(http::kills_count))
        .route("/api/v1/subscriptions", post(http::create_subscription))
        .route("/api/v1/subscriptions/{subscriber_id}", delete(http::delete_subscription))
        .route("/ws/subscriber/{subscriber_id}", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
