// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WandererKills: real-time ingestion, enrichment, caching, and fan-out of
//! killmail events. See `spec.md`/`SPEC_FULL.md` in the workspace root for
//! the full component design; this crate is the core described there.

pub mod broadcaster;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod esi;
pub mod http_fetcher;
pub mod ingestor;
pub mod model;
pub mod preloader;
pub mod pubsub;
pub mod state;
pub mod store;
pub mod subscription;
pub mod time;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::broadcaster::{Broadcaster, WsHub};
use crate::config::WandererConfig;
use crate::enrichment::Pipeline;
use crate::esi::EsiResolver;
use crate::http_fetcher::HttpFetcher;
use crate::preloader::Preloader;
use crate::pubsub::Bus;
use crate::state::AppState;
use crate::store::Store;
use crate::subscription::SubscriptionRegistry;

/// Runs the service until shutdown. Constructs every subsystem in the order
/// the root supervisor owns them (spec §2): Store, HTTP Fetcher, ESI
/// Resolver (seeded from CSV), Subscription Registry, Broadcaster,
/// Enrichment Pipeline, Preloader, Stream Ingestor, GC worker, and finally
/// the HTTP/WebSocket listener.
pub async fn run(config: WandererConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let store = Arc::new(Store::new());

    let fetcher = HttpFetcher::new(
        config.fetch_rate_limit_per_min,
        config.fetch_rate_limit_burst,
        config.max_concurrent_fetches,
    );

    let esi = Arc::new(EsiResolver::new(Arc::clone(&store), fetcher.clone(), config.esi_base_url.clone()));
    if let Some(dir) = &config.ship_types_dir {
        crate::esi::seed::seed_from_dir(&esi, dir).await;
    } else {
        warn!("SHIP_TYPES_DIR not configured, ship type/group names resolve over the network only");
    }

    let registry = Arc::new(SubscriptionRegistry::new());
    let ws_hub = Arc::new(WsHub::new());
    let bus = Arc::new(Bus::connect(config.nats_url.as_deref(), config.nats_prefix.clone()).await?);
    let broadcaster = Arc::new(Broadcaster::new(
        Arc::clone(&registry),
        Arc::clone(&ws_hub),
        config.webhook_concurrency,
        bus,
        Arc::clone(&store),
    ));

    let pipeline = Arc::new(Pipeline::new(Arc::clone(&store), Arc::clone(&esi), config.enrichment_concurrency()));

    let preloader = Arc::new(Preloader::new(
        fetcher.clone(),
        config.zkb_base_url.clone(),
        Arc::clone(&store),
        Arc::clone(&pipeline),
        Arc::clone(&broadcaster),
        config.preload_concurrency,
    ));

    let ingestor_state = crate::state::new_ingestor_state_cell();
    let ingestor = Arc::new(crate::ingestor::StreamIngestor::new(
        fetcher.clone(),
        config.stream_base_url.clone(),
        Arc::clone(&pipeline),
        Arc::clone(&broadcaster),
        config.idle_interval(),
        config.fast_interval(),
        config.max_backoff(),
        Arc::clone(&ingestor_state),
    ));

    let app_state = Arc::new(AppState::new(
        config.clone(),
        shutdown.clone(),
        Arc::clone(&store),
        fetcher,
        esi,
        Arc::clone(&registry),
        Arc::clone(&broadcaster),
        Arc::clone(&pipeline),
        Arc::clone(&preloader),
        ingestor_state,
    ));

    crate::store::gc::spawn_gc_worker(Arc::clone(&store), config.cache_gc_interval(), shutdown.clone());
    app_state.mark_gc_alive();

    ingestor.spawn(shutdown.clone());

    spawn_ctrl_c_handler(shutdown.clone());

    let router = crate::transport::build_router(Arc::clone(&app_state));
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "wanderer-kills listening");
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}

/// Cancels `shutdown` on the first Ctrl-C, giving every cooperative
/// background task (ingestor, GC worker, in-flight deliveries) a chance to
/// wind down (spec §5: "shutdown cancels the ingestor poll and all
/// in-flight deliveries").
fn spawn_ctrl_c_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown.cancel();
        }
    });
}
