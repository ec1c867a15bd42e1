// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic garbage collector (spec §4.9). Runs as a background task,
//! mirroring the shape of `upstream::health::spawn_health_checker`: an
//! interval loop guarded by a `CancellationToken`, proceeding in small
//! batches so it never blocks foreground store operations for long.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Namespace, Store};

const ALL_NAMESPACES: &[Namespace] = &[
    Namespace::Killmail,
    Namespace::SystemKillmails,
    Namespace::SystemCount,
    Namespace::SystemFetchTs,
    Namespace::EsiCharacter,
    Namespace::EsiCorporation,
    Namespace::EsiAlliance,
    Namespace::EsiType,
    Namespace::EsiGroup,
    Namespace::ActiveSystems,
    Namespace::SubscriptionOffset,
];

const BATCH_SIZE: usize = 64;

/// Spawn the periodic GC/cleanup worker.
pub fn spawn_gc_worker(store: Arc<Store>, interval: Duration, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            sweep(&store).await;
        }
    });
}

/// Run one full GC pass: expire entries, compact system killmail lists, and
/// drop `active_systems` entries with no remaining killmails.
pub async fn sweep(store: &Store) {
    let mut total_expired = 0usize;

    for &ns in ALL_NAMESPACES {
        let keys = store.keys_in_namespace(ns).await;
        for batch in keys.chunks(BATCH_SIZE) {
            for composite in batch {
                if store.is_expired(composite).await == Some(true) {
                    store.remove_key(composite).await;
                    total_expired += 1;
                }
            }
            tokio::task::yield_now().await;
        }
    }

    compact_system_killmail_lists(store).await;
    prune_active_systems(store).await;

    if total_expired > 0 {
        debug!(total_expired, "gc: expired entries");
    }
}

/// Remove ids from every `system_killmails` list whose `killmail:{id}` entry
/// no longer exists.
async fn compact_system_killmail_lists(store: &Store) {
    let keys = store.keys_in_namespace(Namespace::SystemKillmails).await;
    for composite in keys.chunks(BATCH_SIZE).flatten() {
        let Some(system_id) = composite.strip_prefix("system_killmails:") else { continue };
        let list = match store.get_list(Namespace::SystemKillmails, system_id).await {
            Ok(l) => l,
            Err(_) => continue,
        };
        for id in list {
            if !store.exists(Namespace::Killmail, &id.to_string()).await {
                let _ = store.remove_from_list(Namespace::SystemKillmails, system_id, id).await;
            }
        }
        tokio::task::yield_now().await;
    }
}

/// Drop `active_systems` members that have no remaining killmails.
async fn prune_active_systems(store: &Store) {
    let members = match store.members(Namespace::ActiveSystems, "all").await {
        Ok(m) => m,
        Err(_) => return,
    };
    for system_id in members {
        let remaining = store
            .get_list(Namespace::SystemKillmails, &system_id.to_string())
            .await
            .unwrap_or_default();
        if remaining.is_empty() {
            let _ = store.remove_from_set(Namespace::ActiveSystems, "all", system_id).await;
        }
    }
}
