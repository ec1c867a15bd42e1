// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rate-limited, bounded-concurrency HTTP GET/POST executor shared by the ESI
//! resolver, the stream ingestor, and the webhook task pool (spec §4.2).
//!
//! Mirrors `upstream::client::UpstreamClient`'s shape (one `reqwest::Client`
//! built once, thin `anyhow`-free wrapper methods) generalized with a
//! `governor` token bucket and a `Semaphore` for the global concurrency cap,
//! plus the retriable/terminal classification and backoff-with-jitter retry
//! loop the teacher's `credential::refresh::refresh_with_retries` sketches
//! without jitter.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};
use rand::Rng;
use reqwest::{Client, StatusCode};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};

pub(crate) const BASE_BACKOFF: Duration = Duration::from_secs(1);
pub(crate) const MAX_BACKOFF: Duration = Duration::from_secs(30);
pub(crate) const MAX_ATTEMPTS: u32 = 5;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type Limiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Shared HTTP fetch executor. Cheap to clone (everything is `Arc`'d).
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    limiter: Arc<Limiter>,
    fetch_permits: Arc<Semaphore>,
}

impl HttpFetcher {
    /// `requests_per_min`/`burst` size the token bucket; `max_concurrent`
    /// bounds the independent global semaphore (spec §5).
    pub fn new(requests_per_min: u32, burst: u32, max_concurrent: usize) -> Self {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap_or_default();
        let per_min = NonZeroU32::new(requests_per_min.max(1)).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst.max(1)).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(per_min).allow_burst(burst);
        Self {
            client,
            limiter: Arc::new(RateLimiter::direct(quota)),
            fetch_permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// GET `url` with `headers`, decoding the body as JSON. Retries
    /// retriable failures with exponential backoff + full jitter, up to
    /// [`MAX_ATTEMPTS`]; terminal failures propagate on the first attempt.
    pub async fn get_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> CoreResult<serde_json::Value> {
        let mut backoff = BASE_BACKOFF;
        for attempt in 1..=MAX_ATTEMPTS {
            self.limiter.until_ready().await;
            let _permit = self.fetch_permits.acquire().await.map_err(|_| {
                CoreError::internal("fetch semaphore closed")
            })?;

            match self.try_get(url, headers).await {
                Ok(value) => return Ok(value),
                Err(e) if e.retriable && attempt < MAX_ATTEMPTS => {
                    debug!(url, attempt, err = %e, "fetch attempt failed, retrying");
                    let jittered = jitter(backoff);
                    tokio::time::sleep(jittered).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(e) => return Err(e),
            }
        }
        Err(CoreError::upstream(format!("{url}: exhausted {MAX_ATTEMPTS} attempts"), false))
    }

    /// POST a JSON body, decoding the response as JSON. Same retry policy as
    /// [`Self::get_json`].
    pub async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> CoreResult<serde_json::Value> {
        let mut backoff = BASE_BACKOFF;
        for attempt in 1..=MAX_ATTEMPTS {
            self.limiter.until_ready().await;
            let _permit = self.fetch_permits.acquire().await.map_err(|_| {
                CoreError::internal("fetch semaphore closed")
            })?;

            match self.try_post(url, headers, body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.retriable && attempt < MAX_ATTEMPTS => {
                    debug!(url, attempt, err = %e, "post attempt failed, retrying");
                    tokio::time::sleep(jitter(backoff)).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(e) => return Err(e),
            }
        }
        Err(CoreError::upstream(format!("{url}: exhausted {MAX_ATTEMPTS} attempts"), false))
    }

    async fn try_get(&self, url: &str, headers: &[(&str, &str)]) -> CoreResult<serde_json::Value> {
        let mut req = self.client.get(url);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        let resp = req.send().await.map_err(classify_transport_error)?;
        Self::decode(resp).await
    }

    async fn try_post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> CoreResult<serde_json::Value> {
        let mut req = self.client.post(url).json(body);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        let resp = req.send().await.map_err(classify_transport_error)?;
        Self::decode(resp).await
    }

    async fn decode(resp: reqwest::Response) -> CoreResult<serde_json::Value> {
        let status = resp.status();
        if let Some(e) = classify_status(status) {
            return Err(e);
        }
        let bytes = resp.bytes().await.map_err(classify_transport_error)?;
        serde_json::from_slice(&bytes)
            .map_err(|_| CoreError::upstream("invalid_body", false).with_context("status", status.as_str()))
    }
}

/// Classifies a non-2xx status per spec §4.2's retriable/terminal split.
pub(crate) fn classify_status(status: StatusCode) -> Option<CoreError> {
    if status.is_success() {
        return None;
    }
    let retriable = matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    );
    Some(CoreError::upstream(format!("upstream returned {status}"), retriable))
}

pub(crate) fn classify_transport_error(e: reqwest::Error) -> CoreError {
    let retriable = e.is_timeout() || e.is_connect() || e.is_request();
    if !(e.is_timeout() || e.is_connect()) {
        warn!(err = %e, "non-retriable transport error");
    }
    CoreError::upstream(e.to_string(), retriable)
}

/// Full jitter: a uniform random delay in `[0, backoff]`.
pub(crate) fn jitter(backoff: Duration) -> Duration {
    let millis = backoff.as_millis().max(1) as u64;
    Duration::from_millis(rand::rng().random_range(0..=millis))
}
