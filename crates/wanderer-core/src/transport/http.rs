// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the downstream REST API (spec §6). Each falls back to
//! the upstream zKillboard REST endpoint only when a system's
//! `system_fetch_ts` has expired, mirroring the teacher's read-through
//! `transport::http::session_screen` (cache hit unless the upstream poll
//! interval has elapsed).

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::enrichment::parse;
use crate::error::{CoreError, CoreResult};
use crate::model::Killmail;
use crate::state::AppState;
use crate::store::Namespace;
use crate::time::{format_rfc3339, now_secs};

const DEFAULT_SINCE_HOURS: i64 = 24;
const DEFAULT_LIMIT: usize = 100;
const SYSTEM_FETCH_LIMIT: usize = 100;

// -- Response / request bodies -----------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub gc_alive: bool,
    pub ingestor_state: crate::state::IngestorState,
}

#[derive(Debug, Deserialize)]
pub struct SystemKillsQuery {
    #[serde(default)]
    pub since_hours: Option<i64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SystemKillsResponse {
    pub kills: Vec<Killmail>,
    pub cached: bool,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct SystemsKillsRequest {
    pub system_ids: Vec<u64>,
    #[serde(default)]
    pub since_hours: Option<i64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SystemsKillsResponse {
    pub systems_kills: std::collections::HashMap<String, Vec<Killmail>>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct CachedKillsResponse {
    pub kills: Vec<Killmail>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct KillCountResponse {
    pub system_id: u64,
    pub count: u64,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub subscriber_id: String,
    #[serde(default)]
    pub system_ids: HashSet<u64>,
    #[serde(default)]
    pub character_ids: HashSet<u64>,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSubscriptionResponse {
    pub subscription_id: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DeleteSubscriptionResponse {
    pub status: &'static str,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /health` — a superset of spec.md's bare `{status, timestamp}`: also
/// reports GC worker liveness and ingestor state (spec §6 **(AMBIENT)**).
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running",
        timestamp: format_rfc3339(now_secs()),
        gc_alive: state.gc_alive(),
        ingestor_state: state.ingestor_state(),
    })
}

/// `GET /api/v1/kills/system/{id}?since_hours=H&limit=L`
pub async fn kills_by_system(
    State(state): State<Arc<AppState>>,
    Path(system_id): Path<u64>,
    Query(query): Query<SystemKillsQuery>,
) -> Result<Json<SystemKillsResponse>, CoreError> {
    let since_hours = query.since_hours.unwrap_or(DEFAULT_SINCE_HOURS);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);

    let refreshed = ensure_system_fresh(&state, system_id).await;
    let kills = load_system_kills(&state, system_id, since_hours, limit).await?;

    Ok(Json(SystemKillsResponse { kills, cached: !refreshed, timestamp: format_rfc3339(now_secs()) }))
}

/// `POST /api/v1/kills/systems`
pub async fn kills_by_systems(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SystemsKillsRequest>,
) -> Result<Json<SystemsKillsResponse>, CoreError> {
    let since_hours = req.since_hours.unwrap_or(DEFAULT_SINCE_HOURS);
    let limit = req.limit.unwrap_or(DEFAULT_LIMIT);

    let mut systems_kills = std::collections::HashMap::with_capacity(req.system_ids.len());
    for system_id in req.system_ids {
        ensure_system_fresh(&state, system_id).await;
        let kills = load_system_kills(&state, system_id, since_hours, limit).await?;
        systems_kills.insert(system_id.to_string(), kills);
    }

    Ok(Json(SystemsKillsResponse { systems_kills, timestamp: format_rfc3339(now_secs()) }))
}

/// `GET /api/v1/kills/cached/{id}` — serves whatever is already in the
/// store, never falling back to the upstream.
pub async fn kills_cached(
    State(state): State<Arc<AppState>>,
    Path(system_id): Path<u64>,
) -> Result<Json<CachedKillsResponse>, CoreError> {
    let kills = load_system_kills(&state, system_id, i64::MAX, DEFAULT_LIMIT).await?;
    Ok(Json(CachedKillsResponse { kills, timestamp: format_rfc3339(now_secs()) }))
}

/// `GET /api/v1/killmail/{id}` — full killmail object or 404.
pub async fn killmail_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Killmail>, CoreError> {
    let killmail = state.store.get_json::<Killmail>(Namespace::Killmail, &id.to_string()).await?;
    Ok(Json(killmail))
}

/// `GET /api/v1/kills/count/{id}`
pub async fn kills_count(
    State(state): State<Arc<AppState>>,
    Path(system_id): Path<u64>,
) -> Result<Json<KillCountResponse>, CoreError> {
    let count = state.store.get_counter(Namespace::SystemCount, &system_id.to_string()).await?;
    Ok(Json(KillCountResponse { system_id, count, timestamp: format_rfc3339(now_secs()) }))
}

/// `POST /api/v1/subscriptions`
pub async fn create_subscription(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> Result<Json<CreateSubscriptionResponse>, CoreError> {
    let subscription_id = state
        .registry
        .subscribe(req.subscriber_id, req.system_ids.clone(), req.character_ids, req.callback_url)
        .await?;

    if !req.system_ids.is_empty() {
        state.preloader.spawn_backfill(subscription_id.clone(), req.system_ids);
    }

    Ok(Json(CreateSubscriptionResponse { subscription_id, status: "active" }))
}

/// `DELETE /api/v1/subscriptions/{subscriber_id}`
pub async fn delete_subscription(
    State(state): State<Arc<AppState>>,
    Path(subscriber_id): Path<String>,
) -> Result<Json<DeleteSubscriptionResponse>, CoreError> {
    state.registry.unsubscribe(&subscriber_id).await?;
    Ok(Json(DeleteSubscriptionResponse { status: "deleted" }))
}

// -- Shared helpers -----------------------------------------------------------

/// Loads up to `limit` killmails for `system_id` younger than `since_hours`,
/// newest first, skipping ids whose `killmail:{id}` entry already expired
/// out from under the index (spec §8: falls through to NotFound, which here
/// just means "not included").
async fn load_system_kills(
    state: &AppState,
    system_id: u64,
    since_hours: i64,
    limit: usize,
) -> CoreResult<Vec<Killmail>> {
    let ids = state.store.get_list(Namespace::SystemKillmails, &system_id.to_string()).await?;
    let cutoff = now_secs() - since_hours.saturating_mul(3600);

    let mut kills = Vec::with_capacity(limit.min(ids.len()));
    for id in ids {
        if kills.len() >= limit {
            break;
        }
        let Ok(killmail) = state.store.get_json::<Killmail>(Namespace::Killmail, &id.to_string()).await else {
            continue;
        };
        if killmail.kill_time < cutoff {
            continue;
        }
        kills.push(killmail);
    }
    Ok(kills)
}

/// Refreshes `system_id` from the upstream zKillboard REST endpoint when its
/// `system_fetch_ts` has expired (spec §2: "falling back to the upstream
/// only when the system's data is older than its fetch-TTL"). Returns
/// whether a fetch actually happened.
async fn ensure_system_fresh(state: &AppState, system_id: u64) -> bool {
    let key = system_id.to_string();
    if state.store.exists(Namespace::SystemFetchTs, &key).await {
        return false;
    }

    let url = format!("{}/systemID/{}/", state.config.zkb_base_url, system_id);
    let items = match state.fetcher.get_json(&url, &[]).await {
        Ok(serde_json::Value::Array(items)) => items,
        Ok(_) => {
            warn!(system_id, "zkillboard system fetch returned a non-array body");
            return false;
        }
        Err(e) => {
            warn!(system_id, err = %e, "zkillboard system fetch failed, serving stale cache");
            return false;
        }
    };

    for item in items.into_iter().take(SYSTEM_FETCH_LIMIT) {
        let zkb = item.get("zkb").cloned().unwrap_or(serde_json::Value::Null);
        if parse::partial_reference(&item, &zkb).is_none() {
            continue;
        }
        if let Err(e) = state.pipeline.ingest_partial(&item, &zkb).await {
            warn!(system_id, err = %e, "ingest during read-through refresh failed");
        }
    }

    let _ = state.store.put(Namespace::SystemFetchTs, &key, crate::store::CacheValue::Counter(now_secs() as u64)).await;
    true
}
