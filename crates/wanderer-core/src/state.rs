// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application state handed to the transport layer: handles onto
//! every subsystem the root supervisor constructs in [`crate::run`], plus
//! the liveness flags `/health` reports (spec §6 **(AMBIENT)**).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::broadcaster::Broadcaster;
use crate::config::WandererConfig;
use crate::enrichment::Pipeline;
use crate::esi::EsiResolver;
use crate::http_fetcher::HttpFetcher;
use crate::preloader::Preloader;
use crate::store::Store;
use crate::subscription::SubscriptionRegistry;

/// Coarse liveness signal for the stream ingestor, surfaced on `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestorState {
    Idle,
    Polling,
    Backoff,
}

/// Shared cell the ingestor writes to and `/health` reads from, handed out
/// before the `AppState` it ends up living inside exists.
pub type IngestorStateCell = Arc<std::sync::Mutex<IngestorState>>;

pub fn new_ingestor_state_cell() -> IngestorStateCell {
    Arc::new(std::sync::Mutex::new(IngestorState::Idle))
}

/// Shared handles every transport handler reaches through. Cheap to clone
/// (everything inside is already `Arc`'d); typically wrapped once more in
/// `Arc<AppState>` for axum's `State` extractor.
pub struct AppState {
    pub config: WandererConfig,
    pub shutdown: CancellationToken,
    pub store: Arc<Store>,
    pub fetcher: HttpFetcher,
    pub esi: Arc<EsiResolver>,
    pub registry: Arc<SubscriptionRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub pipeline: Arc<Pipeline>,
    pub preloader: Arc<Preloader>,
    /// Flips to `true` once the GC worker has completed at least one sweep.
    gc_alive: AtomicBool,
    ingestor_state: IngestorStateCell,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: WandererConfig,
        shutdown: CancellationToken,
        store: Arc<Store>,
        fetcher: HttpFetcher,
        esi: Arc<EsiResolver>,
        registry: Arc<SubscriptionRegistry>,
        broadcaster: Arc<Broadcaster>,
        pipeline: Arc<Pipeline>,
        preloader: Arc<Preloader>,
        ingestor_state: IngestorStateCell,
    ) -> Self {
        Self {
            config,
            shutdown,
            store,
            fetcher,
            esi,
            registry,
            broadcaster,
            pipeline,
            preloader,
            gc_alive: AtomicBool::new(false),
            ingestor_state,
        }
    }

    pub fn mark_gc_alive(&self) {
        self.gc_alive.store(true, Ordering::Relaxed);
    }

    pub fn gc_alive(&self) -> bool {
        self.gc_alive.load(Ordering::Relaxed)
    }

    pub fn ingestor_state(&self) -> IngestorState {
        self.ingestor_state.lock().map(|g| *g).unwrap_or(IngestorState::Idle)
    }
}
