// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Matcher + Broadcaster (spec §4.7): fans one persisted killmail out to
//! every interested subscription's WebSocket queue, webhook, and the
//! pub/sub bus, with per-subscriber failure isolation.

pub mod webhook;
pub mod ws_hub;

use std::sync::Arc;

use tracing::warn;

use crate::model::Killmail;
use crate::pubsub::Bus;
use crate::store::{Namespace, Store};
use crate::subscription::SubscriptionRegistry;

use webhook::WebhookPool;
pub use ws_hub::{QueueHandle, WsHub};

/// Owns the three delivery channels and the registry lookup that drives
/// fan-out decisions.
pub struct Broadcaster {
    registry: Arc<SubscriptionRegistry>,
    ws_hub: Arc<WsHub>,
    webhooks: WebhookPool,
    bus: Arc<Bus>,
    store: Arc<Store>,
}

impl Broadcaster {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        ws_hub: Arc<WsHub>,
        webhook_concurrency: usize,
        bus: Arc<Bus>,
        store: Arc<Store>,
    ) -> Self {
        Self { registry, ws_hub, webhooks: WebhookPool::new(webhook_concurrency), bus, store }
    }

    pub fn ws_hub(&self) -> &Arc<WsHub> {
        &self.ws_hub
    }

    /// Dispatches one freshly-persisted killmail (spec §4.7 steps 1-3). The
    /// killmail's own persist offset (its id) is recorded as each matched
    /// subscriber's new `last_delivered` watermark, both in-memory on the
    /// `Subscription` and persisted to `subscription_offset:{subscriberId}`
    /// for resumable push.
    pub async fn dispatch(&self, killmail: Arc<Killmail>) {
        let interested = self.registry.find_interested(&killmail).await;
        let mut matched = Vec::with_capacity(interested.len());

        for subscription_id in &interested {
            let Some(subscription) = self.registry.get(subscription_id).await else {
                continue;
            };
            matched.push(subscription.id.clone());

            self.ws_hub.push(subscription_id, Arc::clone(&killmail)).await;

            if let Some(callback_url) = subscription.callback_url.clone() {
                self.webhooks.submit(callback_url, Arc::clone(&killmail), killmail.system_id);
            }

            self.record_delivery(subscription_id, &subscription.subscriber_id, killmail.id).await;
        }

        self.bus.publish_killmail(&killmail, &matched).await;
    }

    /// Delivers one killmail to a single subscription only, bypassing
    /// `find_interested` (spec §4.8: preloader backfill "dispatch only to
    /// this newly-created subscription, not to all interested").
    pub async fn deliver_to_subscription(&self, subscription_id: &str, killmail: Arc<Killmail>) {
        let Some(subscription) = self.registry.get(subscription_id).await else {
            return;
        };
        self.ws_hub.push(subscription_id, Arc::clone(&killmail)).await;
        if let Some(callback_url) = subscription.callback_url.clone() {
            self.webhooks.submit(callback_url, Arc::clone(&killmail), killmail.system_id);
        }
        self.record_delivery(subscription_id, &subscription.subscriber_id, killmail.id).await;
    }

    /// Bumps the in-memory `Subscription.last_delivered` watermark and
    /// persists the same monotonic offset to `subscription_offset:{subscriberId}`
    /// (spec §4.7 step 3, spec §3's `subscription_offset` namespace).
    async fn record_delivery(&self, subscription_id: &str, subscriber_id: &str, offset: u64) {
        self.registry.record_delivery(subscription_id, offset).await;
        if let Err(e) = self.store.set_max_counter(Namespace::SubscriptionOffset, subscriber_id, offset).await {
            warn!(subscriber_id, offset, err = %e, "failed to persist subscription offset");
        }
    }
}
