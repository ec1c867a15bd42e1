// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription CRUD with a single-writer discipline over the subscription
//! table and its two derived indexes (spec §4.6). Reads never block other
//! reads; every mutation (insert/update/delete) takes the same write lock so
//! the table and both `InvertedIndex`es move in lockstep.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{CoreError, CoreResult};
use crate::model::Killmail;
use crate::subscription::index::InvertedIndex;
use crate::time::now_secs;

/// A downstream client's declared interest (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub subscriber_id: String,
    pub system_ids: HashSet<u64>,
    pub character_ids: HashSet<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    pub created_at: i64,
    pub last_delivered: u64,
}

struct Inner {
    subscriptions: HashMap<String, Subscription>,
    by_subscriber: HashMap<String, String>,
    by_system: InvertedIndex<u64>,
    by_character: InvertedIndex<u64>,
}

pub struct SubscriptionRegistry {
    inner: RwLock<Inner>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                subscriptions: HashMap::new(),
                by_subscriber: HashMap::new(),
                by_system: InvertedIndex::new(),
                by_character: InvertedIndex::new(),
            }),
        }
    }

    /// `system_ids ∪ character_ids` must be non-empty (spec §3 invariant,
    /// §8 boundary behavior).
    pub async fn subscribe(
        &self,
        subscriber_id: String,
        system_ids: HashSet<u64>,
        character_ids: HashSet<u64>,
        callback_url: Option<String>,
    ) -> CoreResult<String> {
        if system_ids.is_empty() && character_ids.is_empty() {
            return Err(CoreError::validation(
                "subscription must specify at least one system id or character id",
            ));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let subscription = Subscription {
            id: id.clone(),
            subscriber_id: subscriber_id.clone(),
            system_ids: system_ids.clone(),
            character_ids: character_ids.clone(),
            callback_url,
            created_at: now_secs(),
            last_delivered: 0,
        };

        let mut guard = self.inner.write().await;
        if let Some(existing_id) = guard.by_subscriber.get(&subscriber_id).cloned() {
            Self::unindex(&mut guard, &existing_id);
            guard.subscriptions.remove(&existing_id);
        }
        for sys in &system_ids {
            guard.by_system.insert(*sys, &id);
        }
        for ch in &character_ids {
            guard.by_character.insert(*ch, &id);
        }
        guard.by_subscriber.insert(subscriber_id, id.clone());
        guard.subscriptions.insert(id.clone(), subscription);

        Ok(id)
    }

    pub async fn unsubscribe(&self, subscriber_id: &str) -> CoreResult<()> {
        let mut guard = self.inner.write().await;
        let Some(id) = guard.by_subscriber.remove(subscriber_id) else {
            return Err(CoreError::not_found(format!("no subscription for subscriber {subscriber_id}")));
        };
        Self::unindex(&mut guard, &id);
        guard.subscriptions.remove(&id);
        Ok(())
    }

    /// Replaces the whole filter-set for `subscription_id` (spec §3: "mutated
    /// only by replacing whole filter-sets").
    pub async fn update(
        &self,
        subscription_id: &str,
        new_system_ids: HashSet<u64>,
        new_character_ids: HashSet<u64>,
    ) -> CoreResult<()> {
        if new_system_ids.is_empty() && new_character_ids.is_empty() {
            return Err(CoreError::validation(
                "subscription must specify at least one system id or character id",
            ));
        }

        let mut guard = self.inner.write().await;
        if !guard.subscriptions.contains_key(subscription_id) {
            return Err(CoreError::not_found(format!("subscription {subscription_id} not found")));
        }
        Self::unindex(&mut guard, subscription_id);
        for sys in &new_system_ids {
            guard.by_system.insert(*sys, subscription_id);
        }
        for ch in &new_character_ids {
            guard.by_character.insert(*ch, subscription_id);
        }
        if let Some(sub) = guard.subscriptions.get_mut(subscription_id) {
            sub.system_ids = new_system_ids;
            sub.character_ids = new_character_ids;
        }
        Ok(())
    }

    pub async fn get(&self, subscription_id: &str) -> Option<Subscription> {
        self.inner.read().await.subscriptions.get(subscription_id).cloned()
    }

    pub async fn get_by_subscriber(&self, subscriber_id: &str) -> Option<Subscription> {
        let guard = self.inner.read().await;
        let id = guard.by_subscriber.get(subscriber_id)?;
        guard.subscriptions.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<Subscription> {
        self.inner.read().await.subscriptions.values().cloned().collect()
    }

    /// Records that `offset` was delivered to `subscription_id` (spec §4.7
    /// step 3: "monotonic per subscriber").
    pub async fn record_delivery(&self, subscription_id: &str, offset: u64) {
        let mut guard = self.inner.write().await;
        if let Some(sub) = guard.subscriptions.get_mut(subscription_id) {
            sub.last_delivered = sub.last_delivered.max(offset);
        }
    }

    /// The hot path (spec §4.6): union of every subscription whose system or
    /// character filters intersect this killmail's participants.
    pub async fn find_interested(&self, killmail: &Killmail) -> HashSet<String> {
        let guard = self.inner.read().await;
        let mut interested = guard.by_system.members(&killmail.system_id);
        for character_id in killmail.character_ids() {
            interested.extend(guard.by_character.members(&character_id));
        }
        interested
    }

    fn unindex(inner: &mut Inner, subscription_id: &str) {
        let Some(sub) = inner.subscriptions.get(subscription_id) else { return };
        let systems: Vec<u64> = sub.system_ids.iter().copied().collect();
        let characters: Vec<u64> = sub.character_ids.iter().copied().collect();
        for sys in systems {
            inner.by_system.remove(&sys, subscription_id);
        }
        for ch in characters {
            inner.by_character.remove(&ch, subscription_id);
        }
    }
}

pub type SharedRegistry = Arc<SubscriptionRegistry>;
