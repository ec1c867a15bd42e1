// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-subscription historical backfill (spec §4.8). One-shot per system,
//! bounded by `preloadConcurrency`, modeled on the teacher's
//! `upstream::prewarm` slow-poll task: a background loop that fetches and
//! hydrates sessions nobody is actively watching yet, except here it runs
//! once per newly-created subscription rather than on a recurring tick.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::broadcaster::Broadcaster;
use crate::enrichment::{parse, EnrichOutcome, Pipeline};
use crate::http_fetcher::HttpFetcher;
use crate::model::Killmail;
use crate::store::{Namespace, Store};

/// Most recent kills considered per system, per spec §4.8.
const BACKFILL_LIMIT: usize = 100;

pub struct Preloader {
    fetcher: HttpFetcher,
    zkb_base_url: String,
    store: Arc<Store>,
    pipeline: Arc<Pipeline>,
    broadcaster: Arc<Broadcaster>,
    permits: Arc<Semaphore>,
}

impl Preloader {
    pub fn new(
        fetcher: HttpFetcher,
        zkb_base_url: String,
        store: Arc<Store>,
        pipeline: Arc<Pipeline>,
        broadcaster: Arc<Broadcaster>,
        preload_concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            zkb_base_url,
            store,
            pipeline,
            broadcaster,
            permits: Arc::new(Semaphore::new(preload_concurrency.max(1))),
        }
    }

    /// Enqueues one backfill task per system id, each running independently
    /// and bounded by the shared permit pool. Does not block the caller
    /// (spec §4.8 is invoked from the subscribe handler's request path).
    pub fn spawn_backfill(self: &Arc<Self>, subscription_id: String, system_ids: HashSet<u64>) {
        for system_id in system_ids {
            let preloader = Arc::clone(self);
            let subscription_id = subscription_id.clone();
            tokio::spawn(async move {
                let permit = match preloader.permits.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                preloader.backfill_system(&subscription_id, system_id).await;
                drop(permit);
            });
        }
    }

    async fn backfill_system(&self, subscription_id: &str, system_id: u64) {
        let url = format!("{}/systemID/{}/", self.zkb_base_url, system_id);
        let items = match self.fetcher.get_json(&url, &[]).await {
            Ok(serde_json::Value::Array(items)) => items,
            Ok(_) => {
                warn!(system_id, "zkillboard backfill returned a non-array body");
                return;
            }
            Err(e) => {
                warn!(system_id, err = %e, "zkillboard backfill fetch failed");
                return;
            }
        };

        for item in items.into_iter().take(BACKFILL_LIMIT) {
            let zkb = item.get("zkb").cloned().unwrap_or(serde_json::Value::Null);
            let Some((id, _hash)) = parse::partial_reference(&item, &zkb) else {
                continue;
            };

            match self.pipeline.ingest_partial(&item, &zkb).await {
                Ok(EnrichOutcome::Accepted(killmail)) => {
                    self.broadcaster.deliver_to_subscription(subscription_id, killmail).await;
                }
                Ok(EnrichOutcome::DuplicateRejected) => {
                    if let Some(killmail) = self.already_known(id).await {
                        self.broadcaster.deliver_to_subscription(subscription_id, killmail).await;
                    }
                }
                Ok(EnrichOutcome::AgeRejected) | Ok(EnrichOutcome::Invalid(_)) => {}
                Err(e) => debug!(system_id, killmail_id = id, err = %e, "backfill ingest failed"),
            }
        }
    }

    async fn already_known(&self, id: u64) -> Option<Arc<Killmail>> {
        self.store.get_json::<Killmail>(Namespace::Killmail, &id.to_string()).await.ok().map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::esi::EsiResolver;
    use crate::subscription::SubscriptionRegistry;
    use crate::broadcaster::WsHub;
    use crate::pubsub::Bus;
    use std::collections::HashSet as StdHashSet;

    async fn harness() -> (Arc<Preloader>, Arc<SubscriptionRegistry>, Arc<WsHub>) {
        let store = Arc::new(Store::new());
        let fetcher = HttpFetcher::new(1000, 100, 10);
        let esi = Arc::new(EsiResolver::new(Arc::clone(&store), fetcher.clone(), "https://esi.example".into()));
        let pipeline = Arc::new(Pipeline::new(Arc::clone(&store), esi, 4));
        let registry = Arc::new(SubscriptionRegistry::new());
        let ws_hub = Arc::new(WsHub::new());
        let bus = Arc::new(Bus::connect(None, "wanderer_kills".into()).await.expect("bus"));
        let broadcaster =
            Arc::new(Broadcaster::new(Arc::clone(&registry), Arc::clone(&ws_hub), 4, bus, Arc::clone(&store)));
        let preloader = Arc::new(Preloader::new(
            fetcher,
            "https://zkillboard.example/api".into(),
            store,
            pipeline,
            broadcaster,
            2,
        ));
        (preloader, registry, ws_hub)
    }

    #[tokio::test]
    async fn non_array_upstream_body_is_tolerated() {
        let (preloader, _registry, _ws_hub) = harness().await;
        // No real upstream is reachable in a unit test; the fetch itself
        // fails (connection error), exercising the early-return path.
        preloader.backfill_system("sub-a", 30000142).await;
    }

    #[tokio::test]
    async fn spawn_backfill_accepts_an_empty_system_set() {
        let (preloader, registry, ws_hub) = harness().await;
        let id = registry
            .subscribe("a".into(), StdHashSet::new(), StdHashSet::from([1]), None)
            .await
            .expect("subscribed");
        ws_hub.register(&id).await;
        preloader.spawn_backfill(id, StdHashSet::new());
    }
}
