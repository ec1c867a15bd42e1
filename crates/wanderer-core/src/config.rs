// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration for the wanderer-kills service.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration, parsed from flags/env by `clap`.
#[derive(Debug, Clone, clap::Parser)]
pub struct WandererConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "HTTP_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 4004, env = "HTTP_PORT")]
    pub port: u16,

    /// Upstream RedisQ-style stream endpoint base URL.
    #[arg(long, env = "STREAM_BASE_URL", default_value = "https://zkillredisq.stream/listen.php")]
    pub stream_base_url: String,

    /// ESI base URL.
    #[arg(long, env = "ESI_BASE_URL", default_value = "https://esi.evetech.net/latest")]
    pub esi_base_url: String,

    /// zKillboard REST base URL (used by the Preloader for historical backfill).
    #[arg(long, env = "ZKB_BASE_URL", default_value = "https://zkillboard.com/api")]
    pub zkb_base_url: String,

    /// GC sweep interval.
    #[arg(long, default_value_t = 3_600_000, env = "CACHE_GC_INTERVAL_MS")]
    pub cache_gc_interval_ms: u64,

    /// Global concurrency cap on outstanding HTTP fetches.
    #[arg(long, default_value_t = 10, env = "MAX_CONCURRENT_FETCHES")]
    pub max_concurrent_fetches: usize,

    /// Bounded concurrency for the one-shot preload backfill.
    #[arg(long, default_value_t = 2, env = "PRELOAD_CONCURRENCY")]
    pub preload_concurrency: usize,

    /// Directory containing `types.csv` / `groups.csv` seed files.
    #[arg(long, env = "SHIP_TYPES_DIR")]
    pub ship_types_dir: Option<PathBuf>,

    /// Bounded concurrency for per-killmail participant enrichment. Defaults
    /// to the number of available execution contexts.
    #[arg(long, env = "ENRICHMENT_CONCURRENCY")]
    pub enrichment_concurrency: Option<usize>,

    /// Bounded concurrency for webhook delivery.
    #[arg(long, default_value_t = 10, env = "WEBHOOK_CONCURRENCY")]
    pub webhook_concurrency: usize,

    /// Poll delay after a quiet stream response.
    #[arg(long, default_value_t = 5_000, env = "INGESTOR_IDLE_INTERVAL_MS")]
    pub idle_interval_ms: u64,

    /// Poll delay right after a killmail was accepted.
    #[arg(long, default_value_t = 1_000, env = "INGESTOR_FAST_INTERVAL_MS")]
    pub fast_interval_ms: u64,

    /// Backoff cap for repeated ingestor failures.
    #[arg(long, default_value_t = 30_000, env = "INGESTOR_MAX_BACKOFF_MS")]
    pub max_backoff_ms: u64,

    /// Upstream fetch rate limit, requests per minute (token bucket refill rate).
    #[arg(long, default_value_t = 1000, env = "FETCH_RATE_LIMIT_PER_MIN")]
    pub fetch_rate_limit_per_min: u32,

    /// Upstream fetch rate limit burst size.
    #[arg(long, default_value_t = 100, env = "FETCH_RATE_LIMIT_BURST")]
    pub fetch_rate_limit_burst: u32,

    /// Optional NATS server URL. When unset, the pub/sub bus only fans out
    /// in-process.
    #[arg(long, env = "NATS_URL")]
    pub nats_url: Option<String>,

    /// Subject prefix for NATS-backed pub/sub topics.
    #[arg(long, default_value = "wanderer_kills", env = "NATS_PREFIX")]
    pub nats_prefix: String,
}

impl WandererConfig {
    pub fn cache_gc_interval(&self) -> Duration {
        Duration::from_millis(self.cache_gc_interval_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn fast_interval(&self) -> Duration {
        Duration::from_millis(self.fast_interval_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn enrichment_concurrency(&self) -> usize {
        self.enrichment_concurrency
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4))
    }
}
