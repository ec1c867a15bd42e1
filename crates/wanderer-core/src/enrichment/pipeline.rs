// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The enrichment pipeline (spec §4.4): parse → age gate → dedup gate →
//! hydrate-if-partial → validate → enrich participants → persist.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::esi::EsiResolver;
use crate::enrichment::parse;
use crate::error::{CoreError, CoreResult};
use crate::model::Killmail;
use crate::store::{Namespace, Store};
use crate::time::now_secs;

const AGE_GATE: Duration = Duration::from_secs(24 * 3600);
/// End-to-end enrichment timeout (spec §5): beyond this the killmail is
/// dropped with a metric rather than persisted half-enriched.
const ENRICHMENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome of one ingest attempt (spec §4.4, §9's `do_poll` discriminated
/// outcome collapsed onto the enrichment side).
#[derive(Debug)]
pub enum EnrichOutcome {
    Accepted(Arc<Killmail>),
    AgeRejected,
    DuplicateRejected,
    Invalid(String),
}

#[derive(Debug, Clone, Copy)]
enum EntityKind {
    Character,
    Corporation,
    Alliance,
}

pub struct Pipeline {
    store: Arc<Store>,
    esi: Arc<EsiResolver>,
    concurrency: Arc<Semaphore>,
}

impl Pipeline {
    pub fn new(store: Arc<Store>, esi: Arc<EsiResolver>, enrichment_concurrency: usize) -> Self {
        Self { store, esi, concurrency: Arc::new(Semaphore::new(enrichment_concurrency.max(1))) }
    }

    /// Ingests a full-shape `{killmail, zkb}` package.
    pub async fn ingest_full(
        &self,
        killmail_json: &serde_json::Value,
        zkb_json: &serde_json::Value,
    ) -> CoreResult<EnrichOutcome> {
        match tokio::time::timeout(ENRICHMENT_TIMEOUT, self.ingest_full_inner(killmail_json, zkb_json)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("enrichment end-to-end timeout, dropping killmail");
                Ok(EnrichOutcome::Invalid("enrichment timed out".into()))
            }
        }
    }

    /// Ingests a partial/legacy-shape reference, hydrating the full body via
    /// the ESI resolver first (spec §4.4 step 4).
    pub async fn ingest_partial(
        &self,
        reference_json: &serde_json::Value,
        zkb_json: &serde_json::Value,
    ) -> CoreResult<EnrichOutcome> {
        let Some((id, hash)) = parse::partial_reference(reference_json, zkb_json) else {
            return Ok(EnrichOutcome::Invalid("unparseable partial reference".into()));
        };
        if self.store.exists(Namespace::Killmail, &id.to_string()).await {
            return Ok(EnrichOutcome::DuplicateRejected);
        }
        let killmail_json = self.esi.get_killmail_detail(id, &hash).await?;
        self.ingest_full(&killmail_json, zkb_json).await
    }

    async fn ingest_full_inner(
        &self,
        killmail_json: &serde_json::Value,
        zkb_json: &serde_json::Value,
    ) -> CoreResult<EnrichOutcome> {
        // 1. Parse.
        let mut killmail = match parse::parse_full(killmail_json, zkb_json) {
            Ok(km) => km,
            Err(e) => return Ok(EnrichOutcome::Invalid(e)),
        };

        // 2. Age gate.
        if killmail.kill_time < now_secs() - AGE_GATE.as_secs() as i64 {
            return Ok(EnrichOutcome::AgeRejected);
        }

        // 3. Dedup gate.
        let key = killmail.id.to_string();
        if self.store.exists(Namespace::Killmail, &key).await {
            return Ok(EnrichOutcome::DuplicateRejected);
        }

        // 5. Validate structure (step 4, hydrate-if-partial, already happened
        // in `ingest_partial` before this full-shape body reached us).
        if let Err(e) = killmail.validate_structure() {
            return Ok(EnrichOutcome::Invalid(e));
        }

        // 6. Enrich participants, batched per distinct id.
        self.enrich_participants(&mut killmail).await;

        // 7. Persist.
        self.persist(&killmail).await?;

        Ok(EnrichOutcome::Accepted(Arc::new(killmail)))
    }

    async fn enrich_participants(&self, killmail: &mut Killmail) {
        let ids = killmail.entity_ids();

        let (characters, corporations, alliances, ship_types) = tokio::join!(
            self.resolve_names(ids.characters.clone(), EntityKind::Character),
            self.resolve_names(ids.corporations.clone(), EntityKind::Corporation),
            self.resolve_names(ids.alliances.clone(), EntityKind::Alliance),
            self.resolve_types(ids.ship_types.clone()),
        );

        apply_participant(&mut killmail.victim, &characters, &corporations, &alliances, &ship_types);
        for attacker in &mut killmail.attackers {
            apply_participant(attacker, &characters, &corporations, &alliances, &ship_types);
        }
    }

    /// Fans out one lookup per distinct id, bounded by the shared enrichment
    /// concurrency semaphore. Missing entities are tolerated (spec §4.4 step
    /// 6): a failed lookup simply leaves that id's name unresolved.
    async fn resolve_names(
        &self,
        ids: Vec<u64>,
        kind: EntityKind,
    ) -> std::collections::HashMap<u64, String> {
        let futures = ids.into_iter().map(|id| {
            let esi = Arc::clone(&self.esi);
            let sem = Arc::clone(&self.concurrency);
            async move {
                let _permit = sem.acquire().await.ok()?;
                let entity = match kind {
                    EntityKind::Character => esi.get_character(id).await,
                    EntityKind::Corporation => esi.get_corporation(id).await,
                    EntityKind::Alliance => esi.get_alliance(id).await,
                }
                .ok()?;
                Some((id, entity.name))
            }
        });
        join_all(futures).await.into_iter().flatten().collect()
    }

    /// Ship types additionally resolve their group name via `group_id`.
    async fn resolve_types(&self, ids: Vec<u64>) -> std::collections::HashMap<u64, (String, Option<String>)> {
        let futures = ids.into_iter().map(|id| {
            let esi = Arc::clone(&self.esi);
            let sem = Arc::clone(&self.concurrency);
            async move {
                let _permit = sem.acquire().await.ok()?;
                let ty = esi.get_type(id).await.ok()?;
                let group_name = match ty.group_id {
                    Some(gid) => esi.get_group(gid).await.ok().map(|g| g.name),
                    None => None,
                };
                Some((id, (ty.name, group_name)))
            }
        });
        join_all(futures).await.into_iter().flatten().collect()
    }

    /// Atomically (in sequence, with rollback on failure) persists the
    /// killmail and its three derived indexes (spec §4.4 step 7, §5
    /// cancellation: "never leave partial multi-key state").
    async fn persist(&self, killmail: &Killmail) -> CoreResult<()> {
        let key = killmail.id.to_string();
        let system_key = killmail.system_id.to_string();

        self.store.put_json(Namespace::Killmail, &key, killmail).await?;

        if let Err(e) = self.store.add_to_list(Namespace::SystemKillmails, &system_key, killmail.id).await {
            self.store.delete(Namespace::Killmail, &key).await.ok();
            return Err(e);
        }

        if let Err(e) = self.store.incr(Namespace::SystemCount, &system_key).await {
            self.store.remove_from_list(Namespace::SystemKillmails, &system_key, killmail.id).await.ok();
            self.store.delete(Namespace::Killmail, &key).await.ok();
            return Err(e);
        }

        if let Err(e) = self.store.add_to_set(Namespace::ActiveSystems, "all", killmail.system_id).await {
            return Err(CoreError::internal(format!(
                "active_systems insert failed after counter committed: {e}"
            )));
        }

        Ok(())
    }
}

fn apply_participant(
    p: &mut crate::model::Participant,
    characters: &std::collections::HashMap<u64, String>,
    corporations: &std::collections::HashMap<u64, String>,
    alliances: &std::collections::HashMap<u64, String>,
    ship_types: &std::collections::HashMap<u64, (String, Option<String>)>,
) {
    if let Some(id) = p.character_id {
        p.character_name = characters.get(&id).cloned();
    }
    if let Some(id) = p.corporation_id {
        p.corporation_name = corporations.get(&id).cloned();
    }
    if let Some(id) = p.alliance_id {
        p.alliance_name = alliances.get(&id).cloned();
    }
    if let Some(id) = p.ship_type_id {
        if let Some((name, group_name)) = ship_types.get(&id) {
            p.ship_type_name = Some(name.clone());
            p.ship_group_name = group_name.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_killmail(id: u64, kill_time: i64) -> serde_json::Value {
        serde_json::json!({
            "killmail_id": id,
            "killmail_time": crate::time::format_rfc3339(kill_time),
            "solar_system_id": 30000142,
            "victim": {"character_id": 1, "ship_type_id": 587, "damage_taken": 100},
            "attackers": [{"character_id": 2, "damage_done": 100, "final_blow": true}],
        })
    }

    fn sample_zkb() -> serde_json::Value {
        serde_json::json!({"hash": "h", "fittedValue": 1.0, "totalValue": 1.0, "points": 1, "npc": false, "solo": false, "awox": false})
    }

    fn pipeline() -> Pipeline {
        let store = Arc::new(Store::new());
        let fetcher = crate::http_fetcher::HttpFetcher::new(1000, 100, 10);
        let esi = Arc::new(EsiResolver::new(Arc::clone(&store), fetcher, "https://esi.example".into()));
        Pipeline::new(store, esi, 4)
    }

    #[tokio::test]
    async fn rejects_killmails_older_than_24h() {
        let p = pipeline();
        let ancient = now_secs() - 48 * 3600;
        let outcome = p.ingest_full(&sample_killmail(1, ancient), &sample_zkb()).await.expect("ok");
        assert!(matches!(outcome, EnrichOutcome::AgeRejected));
        assert!(!p.store.exists(Namespace::Killmail, "1").await);
    }

    #[tokio::test]
    async fn accepts_and_persists_a_fresh_killmail() {
        let p = pipeline();
        let now = now_secs() - 30;
        let outcome = p.ingest_full(&sample_killmail(9001, now), &sample_zkb()).await.expect("ok");
        assert!(matches!(outcome, EnrichOutcome::Accepted(_)));
        assert!(p.store.exists(Namespace::Killmail, "9001").await);
        let list = p.store.get_list(Namespace::SystemKillmails, "30000142").await.expect("list");
        assert_eq!(list, vec![9001]);
        assert_eq!(p.store.get_counter(Namespace::SystemCount, "30000142").await.expect("count"), 1);
    }

    #[tokio::test]
    async fn duplicate_ingest_is_a_no_op() {
        let p = pipeline();
        let now = now_secs() - 30;
        p.ingest_full(&sample_killmail(9001, now), &sample_zkb()).await.expect("ok");
        let second = p.ingest_full(&sample_killmail(9001, now), &sample_zkb()).await.expect("ok");
        assert!(matches!(second, EnrichOutcome::DuplicateRejected));
        assert_eq!(p.store.get_counter(Namespace::SystemCount, "30000142").await.expect("count"), 1);
        let list = p.store.get_list(Namespace::SystemKillmails, "30000142").await.expect("list");
        assert_eq!(list, vec![9001]);
    }

    #[tokio::test]
    async fn rejects_structurally_invalid_killmail() {
        let p = pipeline();
        let mut km = sample_killmail(9002, now_secs() - 30);
        km["attackers"] = serde_json::json!([]);
        let outcome = p.ingest_full(&km, &sample_zkb()).await.expect("ok");
        assert!(matches!(outcome, EnrichOutcome::Invalid(_)));
    }
}
