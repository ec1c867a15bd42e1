// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Killmail/Participant data model (spec §3). Immutable once enriched.

use serde::{Deserialize, Serialize};

/// One combat event record. Identity is `id`; never mutated after
/// [`crate::enrichment::Pipeline`] persists it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Killmail {
    pub id: u64,
    /// Epoch seconds, UTC.
    pub kill_time: i64,
    pub system_id: u64,
    pub victim: Participant,
    pub attackers: Vec<Participant>,
    pub zkb: ZkbMeta,
}

impl Killmail {
    /// The invariant from spec §3: at least one attacker, exactly one final blow.
    pub fn validate_structure(&self) -> Result<(), String> {
        if self.attackers.is_empty() {
            return Err("attackers must be non-empty".to_owned());
        }
        let final_blows = self.attackers.iter().filter(|a| a.final_blow).count();
        if final_blows != 1 {
            return Err(format!("expected exactly one final blow, found {final_blows}"));
        }
        Ok(())
    }

    /// All distinct character ids referenced by victim or attackers.
    pub fn character_ids(&self) -> impl Iterator<Item = u64> + '_ {
        std::iter::once(self.victim.character_id)
            .chain(self.attackers.iter().map(|a| a.character_id))
            .flatten()
    }

    /// All distinct entity ids needing enrichment, grouped by kind, deduped.
    pub fn entity_ids(&self) -> EntityIds {
        let mut ids = EntityIds::default();
        let participants = std::iter::once(&self.victim).chain(self.attackers.iter());
        for p in participants {
            if let Some(c) = p.character_id {
                ids.characters.push(c);
            }
            if let Some(c) = p.corporation_id {
                ids.corporations.push(c);
            }
            if let Some(a) = p.alliance_id {
                ids.alliances.push(a);
            }
        }
        ids.ship_types.push(self.victim.ship_type_id);
        for a in &self.attackers {
            if let Some(t) = a.ship_type_id_opt() {
                ids.ship_types.push(t);
            }
        }
        ids.dedup();
        ids
    }
}

/// Deduplicated entity ids appearing in one killmail, batched by kind so
/// the enrichment fan-out issues one lookup per distinct id (spec §4.4).
#[derive(Debug, Clone, Default)]
pub struct EntityIds {
    pub characters: Vec<u64>,
    pub corporations: Vec<u64>,
    pub alliances: Vec<u64>,
    pub ship_types: Vec<u64>,
}

impl EntityIds {
    fn dedup(&mut self) {
        for v in [&mut self.characters, &mut self.corporations, &mut self.alliances, &mut self.ship_types] {
            v.sort_unstable();
            v.dedup();
        }
    }
}

/// Either the victim or one attacker of a killmail.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub character_id: Option<u64>,
    pub corporation_id: Option<u64>,
    pub alliance_id: Option<u64>,

    /// Required for the victim, optional (but normally present) for attackers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ship_type_id: Option<u64>,

    /// Victim-only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub damage_taken: Option<u64>,

    /// Attacker-only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub damage_done: Option<u64>,
    #[serde(default)]
    pub final_blow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weapon_type_id: Option<u64>,

    // Resolved by enrichment; absence encodes "unknown" / "not applicable".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corporation_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alliance_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ship_type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ship_group_name: Option<String>,
}

impl Participant {
    fn ship_type_id_opt(&self) -> Option<u64> {
        self.ship_type_id
    }
}

/// Upstream zKillboard metadata attached to every killmail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZkbMeta {
    pub hash: String,
    pub fitted_value: f64,
    pub total_value: f64,
    pub points: u32,
    pub npc: bool,
    pub solo: bool,
    pub awox: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<u64>,
}
