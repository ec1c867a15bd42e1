// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Webhook delivery task pool (spec §4.7 step 2, §5): bounded concurrency,
//! the same retriable/terminal classification and backoff schedule as
//! [`crate::http_fetcher`], isolated per task so one subscriber's dead
//! webhook never blocks another's delivery.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::warn;
use uuid::Uuid;

use crate::http_fetcher::{classify_status, classify_transport_error, jitter, BASE_BACKOFF, MAX_ATTEMPTS, MAX_BACKOFF};
use crate::model::Killmail;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

/// Bounded-concurrency webhook dispatcher.
#[derive(Clone)]
pub struct WebhookPool {
    client: Client,
    permits: Arc<Semaphore>,
}

impl WebhookPool {
    pub fn new(concurrency: usize) -> Self {
        let client = Client::builder().timeout(WEBHOOK_TIMEOUT).build().unwrap_or_default();
        Self { client, permits: Arc::new(Semaphore::new(concurrency.max(1))) }
    }

    /// Spawns the delivery as an isolated task; failures (including
    /// exhausted retries) are logged here and never propagate to the caller.
    pub fn submit(&self, callback_url: String, killmail: Arc<Killmail>, system_id: u64) {
        let pool = self.clone();
        tokio::spawn(async move {
            let permit = match pool.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let body = serde_json::json!({
                "type": "detailed_kill_update",
                "data": {
                    "solar_system_id": system_id,
                    "kills": [killmail.as_ref()],
                    "timestamp": crate::time::format_rfc3339(crate::time::now_secs()),
                },
            });
            let request_id = Uuid::new_v4().to_string();
            if let Err(e) = pool.deliver(&callback_url, &body, &request_id).await {
                warn!(callback_url, request_id, err = %e, "webhook delivery dead-lettered after retries exhausted");
            }
            drop(permit);
        });
    }

    async fn deliver(&self, url: &str, body: &serde_json::Value, request_id: &str) -> Result<(), String> {
        let mut backoff = BASE_BACKOFF;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.try_post(url, body, request_id).await {
                Ok(()) => return Ok(()),
                Err(e) if e.retriable && attempt < MAX_ATTEMPTS => {
                    tokio::time::sleep(jitter(backoff)).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(e) => return Err(e.message),
            }
        }
        Err(format!("{url}: exhausted {MAX_ATTEMPTS} attempts"))
    }

    async fn try_post(
        &self,
        url: &str,
        body: &serde_json::Value,
        request_id: &str,
    ) -> Result<(), crate::error::CoreError> {
        let resp = self
            .client
            .post(url)
            .header("X-Request-Id", request_id)
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;
        let status = resp.status();
        if let Some(e) = classify_status(status) {
            return Err(e);
        }
        Ok(())
    }
}
