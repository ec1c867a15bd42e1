// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Namespaced key-value cache/store (spec §4.1). Single source of truth for
//! every cached value and secondary index in the service; every other
//! subsystem reaches the store only through the operations here.

pub mod gc;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::error::{CoreError, CoreResult};
use crate::time::now_secs;

const STORE_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// The namespaces the store serves, with their default TTL policy (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Killmail,
    SystemKillmails,
    SystemCount,
    SystemFetchTs,
    EsiCharacter,
    EsiCorporation,
    EsiAlliance,
    EsiType,
    EsiGroup,
    ActiveSystems,
    SubscriptionOffset,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Killmail => "killmail",
            Self::SystemKillmails => "system_killmails",
            Self::SystemCount => "system_count",
            Self::SystemFetchTs => "system_fetch_ts",
            Self::EsiCharacter => "esi_character",
            Self::EsiCorporation => "esi_corp",
            Self::EsiAlliance => "esi_alliance",
            Self::EsiType => "esi_type",
            Self::EsiGroup => "esi_group",
            Self::ActiveSystems => "active_systems",
            Self::SubscriptionOffset => "subscription_offset",
        }
    }

    /// Default TTL for entries in this namespace.
    pub fn default_ttl(&self) -> Duration {
        match self {
            Self::Killmail | Self::SystemKillmails | Self::SystemCount => Duration::from_secs(7 * 86400),
            Self::SystemFetchTs | Self::ActiveSystems => Duration::from_secs(86400),
            Self::EsiCharacter
            | Self::EsiCorporation
            | Self::EsiAlliance
            | Self::EsiType
            | Self::EsiGroup => Duration::from_secs(24 * 3600),
            Self::SubscriptionOffset => Duration::from_secs(3 * 86400),
        }
    }

    /// Bounded list length, where applicable.
    pub fn list_bound(&self) -> Option<usize> {
        match self {
            Self::SystemKillmails => Some(1000),
            _ => None,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Polymorphic cache value (spec §3's "Cache Entry").
#[derive(Debug, Clone)]
pub enum CacheValue {
    Json(serde_json::Value),
    /// Ordered, newest-first, deduplicated list of ids.
    List(Vec<u64>),
    Counter(u64),
    Set(HashSet<u64>),
}

impl CacheValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::List(_) => "list",
            Self::Counter(_) => "counter",
            Self::Set(_) => "set",
        }
    }
}

struct Slot {
    value: CacheValue,
    expires_at: i64,
}

impl Slot {
    fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// The store. Cloning is cheap (it's an `Arc` internally via `RwLock`/`Mutex`
/// wrapping shared maps); typical usage wraps one instance in `Arc` at the
/// supervisor and hands out references.
pub struct Store {
    // Keyed by the wire-format composite key `{namespace}:{id}`, exactly as
    // spec §3 describes. Per-key exclusion is the inner `Mutex<Slot>`; the
    // outer `RwLock` only guards insertion/removal of whole keys, mirroring
    // the double-checked-locking shape of `transport::ws::get_or_create_bridge`.
    data: RwLock<HashMap<String, Arc<Mutex<Slot>>>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self { data: RwLock::new(HashMap::new()) }
    }

    fn composite_key(ns: Namespace, key: &str) -> String {
        format!("{ns}:{key}")
    }

    async fn get_or_create_slot(&self, composite: &str, init: impl FnOnce() -> Slot) -> Arc<Mutex<Slot>> {
        {
            let guard = self.data.read().await;
            if let Some(slot) = guard.get(composite) {
                return Arc::clone(slot);
            }
        }
        let mut guard = self.data.write().await;
        if let Some(slot) = guard.get(composite) {
            return Arc::clone(slot);
        }
        let slot = Arc::new(Mutex::new(init()));
        guard.insert(composite.to_owned(), Arc::clone(&slot));
        slot
    }

    async fn lookup_slot(&self, composite: &str) -> Option<Arc<Mutex<Slot>>> {
        self.data.read().await.get(composite).cloned()
    }

    async fn with_timeout<T>(fut: impl std::future::Future<Output = T>) -> CoreResult<T> {
        tokio::time::timeout(STORE_OP_TIMEOUT, fut)
            .await
            .map_err(|_| CoreError::timeout("store operation timed out"))
    }

    // -- Raw operations -------------------------------------------------

    pub async fn get(&self, ns: Namespace, key: &str) -> CoreResult<CacheValue> {
        let composite = Self::composite_key(ns, key);
        Self::with_timeout(async {
            let Some(slot) = self.lookup_slot(&composite).await else {
                return Err(CoreError::not_found(format!("{composite} not found")));
            };
            let guard = slot.lock().await;
            if guard.is_expired(now_secs()) {
                drop(guard);
                self.try_remove(&composite).await;
                return Err(CoreError::not_found(format!("{composite} expired")));
            }
            Ok(guard.value.clone())
        })
        .await?
    }

    async fn try_remove(&self, composite: &str) {
        if let Ok(mut guard) = self.data.try_write() {
            guard.remove(composite);
        }
    }

    pub async fn exists(&self, ns: Namespace, key: &str) -> bool {
        self.get(ns, key).await.is_ok()
    }

    pub async fn put(&self, ns: Namespace, key: &str, value: CacheValue) -> CoreResult<()> {
        self.put_with_ttl(ns, key, value, ns.default_ttl()).await
    }

    pub async fn put_with_ttl(
        &self,
        ns: Namespace,
        key: &str,
        value: CacheValue,
        ttl: Duration,
    ) -> CoreResult<()> {
        let composite = Self::composite_key(ns, key);
        let expires_at = now_secs() + ttl.as_secs() as i64;
        Self::with_timeout(async {
            let mut guard = self.data.write().await;
            guard.insert(composite, Arc::new(Mutex::new(Slot { value, expires_at })));
        })
        .await
    }

    pub async fn delete(&self, ns: Namespace, key: &str) -> CoreResult<()> {
        let composite = Self::composite_key(ns, key);
        Self::with_timeout(async {
            self.data.write().await.remove(&composite);
        })
        .await
    }

    // -- Typed JSON convenience ------------------------------------------

    pub async fn get_json<T: DeserializeOwned>(&self, ns: Namespace, key: &str) -> CoreResult<T> {
        match self.get(ns, key).await? {
            CacheValue::Json(v) => serde_json::from_value(v)
                .map_err(|e| CoreError::internal(format!("corrupt {ns} entry: {e}"))),
            other => Err(CoreError::type_mismatch(format!(
                "{ns}:{key} is a {}, not json",
                other.type_name()
            ))),
        }
    }

    pub async fn put_json<T: Serialize>(&self, ns: Namespace, key: &str, value: &T) -> CoreResult<()> {
        let json = serde_json::to_value(value).map_err(|e| CoreError::internal(e.to_string()))?;
        self.put(ns, key, CacheValue::Json(json)).await
    }

    pub async fn put_json_with_ttl<T: Serialize>(
        &self,
        ns: Namespace,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> CoreResult<()> {
        let json = serde_json::to_value(value).map_err(|e| CoreError::internal(e.to_string()))?;
        self.put_with_ttl(ns, key, CacheValue::Json(json), ttl).await
    }

    // -- List operations (system_killmails) ------------------------------

    /// Prepend `element` to the list at `(ns, key)` with set-semantics
    /// dedup, honoring the namespace's bound (oldest evicted first).
    pub async fn add_to_list(&self, ns: Namespace, key: &str, element: u64) -> CoreResult<()> {
        let composite = Self::composite_key(ns, key);
        let bound = ns.list_bound();
        let ttl = ns.default_ttl();
        Self::with_timeout(async {
            let slot = self
                .get_or_create_slot(&composite, || Slot {
                    value: CacheValue::List(Vec::new()),
                    expires_at: now_secs() + ttl.as_secs() as i64,
                })
                .await;
            let mut guard = slot.lock().await;
            if guard.is_expired(now_secs()) {
                guard.value = CacheValue::List(Vec::new());
            }
            guard.expires_at = now_secs() + ttl.as_secs() as i64;
            let CacheValue::List(list) = &mut guard.value else {
                return Err(CoreError::type_mismatch(format!("{composite} is not a list")));
            };
            list.retain(|&id| id != element);
            list.insert(0, element);
            if let Some(n) = bound {
                list.truncate(n);
            }
            Ok(())
        })
        .await?
    }

    pub async fn remove_from_list(&self, ns: Namespace, key: &str, element: u64) -> CoreResult<()> {
        let composite = Self::composite_key(ns, key);
        Self::with_timeout(async {
            let Some(slot) = self.lookup_slot(&composite).await else {
                return Ok(());
            };
            let mut guard = slot.lock().await;
            if let CacheValue::List(list) = &mut guard.value {
                list.retain(|&id| id != element);
            }
            Ok(())
        })
        .await?
    }

    pub async fn get_list(&self, ns: Namespace, key: &str) -> CoreResult<Vec<u64>> {
        match self.get(ns, key).await {
            Ok(CacheValue::List(list)) => Ok(list),
            Ok(other) => Err(CoreError::type_mismatch(format!("{ns}:{key} is a {}", other.type_name()))),
            Err(e) if e.kind == crate::error::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    // -- Counter operations (system_count) -------------------------------

    /// Increment the counter at `(ns, key)`, creating it at 1 if missing.
    pub async fn incr(&self, ns: Namespace, key: &str) -> CoreResult<u64> {
        let composite = Self::composite_key(ns, key);
        let ttl = ns.default_ttl();
        Self::with_timeout(async {
            let slot = self
                .get_or_create_slot(&composite, || Slot {
                    value: CacheValue::Counter(0),
                    expires_at: now_secs() + ttl.as_secs() as i64,
                })
                .await;
            let mut guard = slot.lock().await;
            if guard.is_expired(now_secs()) {
                guard.value = CacheValue::Counter(0);
                guard.expires_at = now_secs() + ttl.as_secs() as i64;
            }
            let CacheValue::Counter(n) = &mut guard.value else {
                return Err(CoreError::type_mismatch(format!("{composite} is not a counter")));
            };
            *n += 1;
            Ok(*n)
        })
        .await?
    }

    pub async fn get_counter(&self, ns: Namespace, key: &str) -> CoreResult<u64> {
        match self.get(ns, key).await {
            Ok(CacheValue::Counter(n)) => Ok(n),
            Ok(other) => Err(CoreError::type_mismatch(format!("{ns}:{key} is a {}", other.type_name()))),
            Err(e) if e.kind == crate::error::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Sets the counter at `(ns, key)` to `max(current, value)`, creating it
    /// if missing. Used for monotonic watermarks such as
    /// `subscription_offset` (spec §4.7 step 3: "max delivered offset").
    pub async fn set_max_counter(&self, ns: Namespace, key: &str, value: u64) -> CoreResult<()> {
        let composite = Self::composite_key(ns, key);
        let ttl = ns.default_ttl();
        Self::with_timeout(async {
            let slot = self
                .get_or_create_slot(&composite, || Slot {
                    value: CacheValue::Counter(0),
                    expires_at: now_secs() + ttl.as_secs() as i64,
                })
                .await;
            let mut guard = slot.lock().await;
            if guard.is_expired(now_secs()) {
                guard.value = CacheValue::Counter(0);
            }
            guard.expires_at = now_secs() + ttl.as_secs() as i64;
            let CacheValue::Counter(n) = &mut guard.value else {
                return Err(CoreError::type_mismatch(format!("{composite} is not a counter")));
            };
            *n = (*n).max(value);
            Ok(())
        })
        .await?
    }

    // -- Set operations (active_systems) ----------------------------------

    pub async fn add_to_set(&self, ns: Namespace, key: &str, element: u64) -> CoreResult<()> {
        let composite = Self::composite_key(ns, key);
        let ttl = ns.default_ttl();
        Self::with_timeout(async {
            let slot = self
                .get_or_create_slot(&composite, || Slot {
                    value: CacheValue::Set(HashSet::new()),
                    expires_at: now_secs() + ttl.as_secs() as i64,
                })
                .await;
            let mut guard = slot.lock().await;
            if guard.is_expired(now_secs()) {
                guard.value = CacheValue::Set(HashSet::new());
            }
            // "refreshed on insert" (spec §3): touching the set renews its TTL.
            guard.expires_at = now_secs() + ttl.as_secs() as i64;
            let CacheValue::Set(set) = &mut guard.value else {
                return Err(CoreError::type_mismatch(format!("{composite} is not a set")));
            };
            set.insert(element);
            Ok(())
        })
        .await?
    }

    pub async fn remove_from_set(&self, ns: Namespace, key: &str, element: u64) -> CoreResult<()> {
        let composite = Self::composite_key(ns, key);
        Self::with_timeout(async {
            let Some(slot) = self.lookup_slot(&composite).await else {
                return Ok(());
            };
            let mut guard = slot.lock().await;
            if let CacheValue::Set(set) = &mut guard.value {
                set.remove(&element);
            }
            Ok(())
        })
        .await?
    }

    pub async fn members(&self, ns: Namespace, key: &str) -> CoreResult<HashSet<u64>> {
        match self.get(ns, key).await {
            Ok(CacheValue::Set(set)) => Ok(set),
            Ok(other) => Err(CoreError::type_mismatch(format!("{ns}:{key} is a {}", other.type_name()))),
            Err(e) if e.kind == crate::error::ErrorKind::NotFound => Ok(HashSet::new()),
            Err(e) => Err(e),
        }
    }

    pub async fn in_set(&self, ns: Namespace, key: &str, element: u64) -> CoreResult<bool> {
        Ok(self.members(ns, key).await?.contains(&element))
    }

    /// Snapshot of all composite keys under a namespace prefix, for GC scans.
    async fn keys_in_namespace(&self, ns: Namespace) -> Vec<String> {
        let prefix = format!("{ns}:");
        self.data.read().await.keys().filter(|k| k.starts_with(&prefix)).cloned().collect()
    }

    /// Whether the entry at `composite` (already namespaced) is expired,
    /// without removing it. Returns `None` if absent.
    async fn is_expired(&self, composite: &str) -> Option<bool> {
        let slot = self.lookup_slot(composite).await?;
        let guard = slot.lock().await;
        Some(guard.is_expired(now_secs()))
    }

    async fn remove_key(&self, composite: &str) {
        self.data.write().await.remove(composite);
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
