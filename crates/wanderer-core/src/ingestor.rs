// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream Ingestor (spec §4.5): a single long-poll conversation with the
//! upstream stream endpoint, reconnecting/backing off the way the teacher's
//! `upstream::feed::spawn_event_feed` backs off a dropped WebSocket, except
//! here every tick is its own request-response rather than a held
//! connection, and the reschedule delay is outcome-dependent (the table in
//! §4.5) rather than a flat exponential curve.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::broadcaster::Broadcaster;
use crate::enrichment::{EnrichOutcome, Pipeline};
use crate::http_fetcher::HttpFetcher;
use crate::state::{IngestorState, IngestorStateCell};

const BASE_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollOutcome {
    Accepted,
    NoKills,
    AgeOrDuplicateRejected,
    ProtocolError,
    FetchError,
}

/// Maintains the long-poll conversation and drives each accepted killmail
/// through enrichment and fan-out.
pub struct StreamIngestor {
    fetcher: HttpFetcher,
    stream_base_url: String,
    pipeline: Arc<Pipeline>,
    broadcaster: Arc<Broadcaster>,
    queue_id: String,
    idle_interval: Duration,
    fast_interval: Duration,
    max_backoff: Duration,
    state: IngestorStateCell,
}

impl StreamIngestor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: HttpFetcher,
        stream_base_url: String,
        pipeline: Arc<Pipeline>,
        broadcaster: Arc<Broadcaster>,
        idle_interval: Duration,
        fast_interval: Duration,
        max_backoff: Duration,
        state: IngestorStateCell,
    ) -> Self {
        Self {
            fetcher,
            stream_base_url,
            pipeline,
            broadcaster,
            queue_id: Uuid::new_v4().to_string(),
            idle_interval,
            fast_interval,
            max_backoff,
            state,
        }
    }

    fn set_state(&self, s: IngestorState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = s;
        }
    }

    /// Spawns the poll loop. Cooperative shutdown: the in-flight poll (and
    /// any enrichment it triggers) is allowed to finish before `shutdown`
    /// breaks the loop.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) {
        tokio::spawn(async move {
            let mut delay = self.idle_interval;
            let mut backoff = BASE_BACKOFF;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                if shutdown.is_cancelled() {
                    break;
                }

                self.set_state(IngestorState::Polling);
                let outcome = self.poll_once().await;
                delay = match outcome {
                    PollOutcome::Accepted => {
                        backoff = BASE_BACKOFF;
                        self.set_state(IngestorState::Idle);
                        self.fast_interval
                    }
                    PollOutcome::NoKills | PollOutcome::AgeOrDuplicateRejected => {
                        backoff = BASE_BACKOFF;
                        self.set_state(IngestorState::Idle);
                        self.idle_interval
                    }
                    PollOutcome::ProtocolError | PollOutcome::FetchError => {
                        let current = backoff;
                        backoff = (backoff * 2).min(self.max_backoff);
                        self.set_state(IngestorState::Backoff);
                        current
                    }
                };
            }

            debug!("stream ingestor shut down");
        });
    }

    async fn poll_once(&self) -> PollOutcome {
        let url = format!("{}?queueID={}&ttw=1", self.stream_base_url, self.queue_id);
        let envelope = match self.fetcher.get_json(&url, &[]).await {
            Ok(value) => value,
            Err(e) => {
                warn!(err = %e, "stream poll failed");
                return PollOutcome::FetchError;
            }
        };

        let Some(package) = envelope.get("package") else {
            return PollOutcome::ProtocolError;
        };
        if package.is_null() {
            return PollOutcome::NoKills;
        }

        let outcome = if package.get("killmail").is_some() {
            let zkb = package.get("zkb").cloned().unwrap_or(serde_json::Value::Null);
            self.pipeline.ingest_full(&package["killmail"], &zkb).await
        } else if package.get("killID").is_some() {
            let zkb = package.get("zkb").cloned().unwrap_or(serde_json::Value::Null);
            self.pipeline.ingest_partial(package, &zkb).await
        } else {
            return PollOutcome::ProtocolError;
        };

        match outcome {
            Ok(EnrichOutcome::Accepted(killmail)) => {
                self.broadcaster.dispatch(killmail).await;
                PollOutcome::Accepted
            }
            Ok(EnrichOutcome::AgeRejected | EnrichOutcome::DuplicateRejected) => {
                PollOutcome::AgeOrDuplicateRejected
            }
            Ok(EnrichOutcome::Invalid(reason)) => {
                debug!(reason, "stream ingest produced an invalid killmail");
                PollOutcome::AgeOrDuplicateRejected
            }
            Err(e) => {
                warn!(err = %e, "stream ingest enrichment failed");
                PollOutcome::FetchError
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::esi::EsiResolver;
    use crate::pubsub::Bus;
    use crate::store::Store;
    use crate::subscription::SubscriptionRegistry;
    use crate::broadcaster::WsHub;

    async fn ingestor() -> StreamIngestor {
        let store = Arc::new(Store::new());
        let fetcher = HttpFetcher::new(1000, 100, 10);
        let esi = Arc::new(EsiResolver::new(Arc::clone(&store), fetcher.clone(), "https://esi.example".into()));
        let pipeline = Arc::new(Pipeline::new(Arc::clone(&store), esi, 4));
        let registry = Arc::new(SubscriptionRegistry::new());
        let ws_hub = Arc::new(WsHub::new());
        let bus = Arc::new(Bus::connect(None, "wanderer_kills".into()).await.expect("bus"));
        let broadcaster = Arc::new(Broadcaster::new(registry, ws_hub, 4, bus, store));
        StreamIngestor::new(
            fetcher,
            "https://stream.example/listen.php".into(),
            pipeline,
            broadcaster,
            Duration::from_secs(5),
            Duration::from_secs(1),
            Duration::from_secs(30),
            crate::state::new_ingestor_state_cell(),
        )
    }

    #[tokio::test]
    async fn fetch_failure_is_classified_as_fetch_error() {
        let ingestor = ingestor().await;
        // No real upstream is reachable; the connection attempt fails.
        let outcome = ingestor.poll_once().await;
        assert_eq!(outcome, PollOutcome::FetchError);
    }
}
