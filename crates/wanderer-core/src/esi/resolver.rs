// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-through ESI cache (spec §4.3). Single-flight per `(kind, id)`: a
//! miss takes a per-key lock (double-checked against the cache exactly like
//! `Store::get_or_create_slot`/`transport::ws::get_or_create_bridge`) so
//! concurrent callers for the same entity coalesce onto one upstream fetch.
//! Failures are never cached — the lock is simply released and the next
//! caller retries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::error::CoreResult;
use crate::http_fetcher::HttpFetcher;
use crate::store::{Namespace, Store};

const ESI_TTL: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EsiKind {
    Character,
    Corporation,
    Alliance,
    Type,
    Group,
}

impl EsiKind {
    fn namespace(self) -> Namespace {
        match self {
            Self::Character => Namespace::EsiCharacter,
            Self::Corporation => Namespace::EsiCorporation,
            Self::Alliance => Namespace::EsiAlliance,
            Self::Type => Namespace::EsiType,
            Self::Group => Namespace::EsiGroup,
        }
    }

    fn path(self, id: u64) -> String {
        match self {
            Self::Character => format!("/characters/{id}/"),
            Self::Corporation => format!("/corporations/{id}/"),
            Self::Alliance => format!("/alliances/{id}/"),
            Self::Type => format!("/universe/types/{id}/"),
            Self::Group => format!("/universe/groups/{id}/"),
        }
    }
}

/// A resolved name, shared shape for every entity kind this resolver serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsiEntity {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<u64>,
}

pub struct EsiResolver {
    store: Arc<Store>,
    fetcher: HttpFetcher,
    base_url: String,
    inflight: RwLock<HashMap<(EsiKind, u64), Arc<Mutex<()>>>>,
}

impl EsiResolver {
    pub fn new(store: Arc<Store>, fetcher: HttpFetcher, base_url: String) -> Self {
        Self { store, fetcher, base_url, inflight: RwLock::new(HashMap::new()) }
    }

    pub async fn get_character(&self, id: u64) -> CoreResult<EsiEntity> {
        self.resolve(EsiKind::Character, id).await
    }

    pub async fn get_corporation(&self, id: u64) -> CoreResult<EsiEntity> {
        self.resolve(EsiKind::Corporation, id).await
    }

    pub async fn get_alliance(&self, id: u64) -> CoreResult<EsiEntity> {
        self.resolve(EsiKind::Alliance, id).await
    }

    pub async fn get_type(&self, id: u64) -> CoreResult<EsiEntity> {
        self.resolve(EsiKind::Type, id).await
    }

    pub async fn get_group(&self, id: u64) -> CoreResult<EsiEntity> {
        self.resolve(EsiKind::Group, id).await
    }

    /// Seed an entry directly (used by CSV seeding at startup). Advisory:
    /// callers log-and-continue on error.
    pub async fn seed(&self, kind_ns: Namespace, id: u64, entity: &EsiEntity) -> CoreResult<()> {
        self.store.put_json_with_ttl(kind_ns, &id.to_string(), entity, ESI_TTL).await
    }

    /// Fetch the full killmail body for the hydrate-if-partial step (spec
    /// §4.4 step 4). Not cached by this resolver — the enrichment pipeline's
    /// dedup gate on `killmail:{id}` is the cache for this call.
    pub async fn get_killmail_detail(&self, id: u64, hash: &str) -> CoreResult<serde_json::Value> {
        let url = format!("{}/killmails/{id}/{hash}/", self.base_url);
        self.fetcher.get_json(&url, &[]).await
    }

    async fn resolve(&self, kind: EsiKind, id: u64) -> CoreResult<EsiEntity> {
        let ns = kind.namespace();
        let key = id.to_string();

        if let Ok(entity) = self.store.get_json::<EsiEntity>(ns, &key).await {
            return Ok(entity);
        }

        let lock = self.lock_for(kind, id).await;
        let _guard = lock.lock().await;

        // Double-check: another caller may have populated the cache while we
        // waited for the lock.
        if let Ok(entity) = self.store.get_json::<EsiEntity>(ns, &key).await {
            return Ok(entity);
        }

        let url = format!("{}{}", self.base_url, kind.path(id));
        let body = self.fetcher.get_json(&url, &[]).await?;
        let entity = entity_from_body(kind, &body);
        self.store.put_json_with_ttl(ns, &key, &entity, ESI_TTL).await?;
        Ok(entity)
    }

    async fn lock_for(&self, kind: EsiKind, id: u64) -> Arc<Mutex<()>> {
        {
            let guard = self.inflight.read().await;
            if let Some(lock) = guard.get(&(kind, id)) {
                return Arc::clone(lock);
            }
        }
        let mut guard = self.inflight.write().await;
        if let Some(lock) = guard.get(&(kind, id)) {
            return Arc::clone(lock);
        }
        let lock = Arc::new(Mutex::new(()));
        guard.insert((kind, id), Arc::clone(&lock));
        lock
    }
}

fn entity_from_body(kind: EsiKind, body: &serde_json::Value) -> EsiEntity {
    let name = body
        .get("name")
        .or_else(|| body.get("type_name"))
        .or_else(|| body.get("typeName"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_owned();
    let group_id = match kind {
        EsiKind::Type => body.get("group_id").and_then(|v| v.as_u64()),
        _ => None,
    };
    EsiEntity { name, group_id }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_name_from_either_field_spelling() {
        let body = serde_json::json!({"type_name": "Rifter", "group_id": 25});
        let entity = entity_from_body(EsiKind::Type, &body);
        assert_eq!(entity.name, "Rifter");
        assert_eq!(entity.group_id, Some(25));
    }

    #[test]
    fn falls_back_to_unknown_on_missing_name() {
        let body = serde_json::json!({});
        let entity = entity_from_body(EsiKind::Character, &body);
        assert_eq!(entity.name, "unknown");
    }

    #[tokio::test]
    async fn seed_populates_the_store_directly() {
        let store = Arc::new(Store::new());
        let fetcher = HttpFetcher::new(1000, 100, 10);
        let resolver = EsiResolver::new(store, fetcher, "https://esi.example".into());
        resolver
            .seed(Namespace::EsiType, 587, &EsiEntity { name: "Rifter".into(), group_id: Some(25) })
            .await
            .expect("seed");
        let entity = resolver.get_type(587).await.expect("cached hit, no network");
        assert_eq!(entity.name, "Rifter");
    }
}
