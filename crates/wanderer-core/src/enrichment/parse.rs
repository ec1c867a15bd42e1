// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-format parsing: normalizes the upstream's field names
//! (`solar_system_id` → `systemId`, `killmail_time` → `killTime`) into the
//! internal [`crate::model::Killmail`] shape (spec §3, §4.4 step 1).

use crate::model::{Killmail, Participant, ZkbMeta};
use crate::time::parse_rfc3339;

/// Returns `true` when `value` is the partial stream shape
/// `{killmail_id, zkb}` (no inlined `victim`/`attackers`).
pub fn is_partial(value: &serde_json::Value) -> bool {
    value.get("victim").is_none()
}

/// Extracts `(killmail_id, hash)` from a partial-shape or legacy-shape
/// envelope for the hydrate-if-partial step.
pub fn partial_reference(value: &serde_json::Value, zkb: &serde_json::Value) -> Option<(u64, String)> {
    let id = value
        .get("killmail_id")
        .or_else(|| value.get("killID"))
        .and_then(|v| v.as_u64())?;
    let hash = zkb.get("hash")?.as_str()?.to_owned();
    Some((id, hash))
}

/// Parses the full-shape killmail body plus sibling `zkb` metadata into a
/// [`Killmail`] with unresolved (unnamed) participants. Names are filled in
/// by the enrichment stage, not here.
pub fn parse_full(killmail: &serde_json::Value, zkb: &serde_json::Value) -> Result<Killmail, String> {
    let id = killmail
        .get("killmail_id")
        .and_then(|v| v.as_u64())
        .ok_or("missing killmail_id")?;
    let system_id = killmail
        .get("solar_system_id")
        .and_then(|v| v.as_u64())
        .ok_or("missing solar_system_id")?;
    let kill_time_str = killmail
        .get("killmail_time")
        .and_then(|v| v.as_str())
        .ok_or("missing killmail_time")?;
    let kill_time = parse_rfc3339(kill_time_str).ok_or("unparseable killmail_time")?;

    let victim_json = killmail.get("victim").ok_or("missing victim")?;
    let victim = parse_victim(victim_json)?;

    let attackers_json = killmail
        .get("attackers")
        .and_then(|v| v.as_array())
        .ok_or("missing attackers")?;
    let attackers: Vec<Participant> =
        attackers_json.iter().map(parse_attacker).collect::<Result<_, _>>()?;

    let zkb = parse_zkb(zkb)?;

    Ok(Killmail { id, kill_time, system_id, victim, attackers, zkb })
}

fn parse_victim(v: &serde_json::Value) -> Result<Participant, String> {
    let ship_type_id = v.get("ship_type_id").and_then(|x| x.as_u64()).ok_or("victim missing ship_type_id")?;
    Ok(Participant {
        character_id: v.get("character_id").and_then(|x| x.as_u64()),
        corporation_id: v.get("corporation_id").and_then(|x| x.as_u64()),
        alliance_id: v.get("alliance_id").and_then(|x| x.as_u64()),
        ship_type_id: Some(ship_type_id),
        damage_taken: v.get("damage_taken").and_then(|x| x.as_u64()),
        damage_done: None,
        final_blow: false,
        weapon_type_id: None,
        character_name: None,
        corporation_name: None,
        alliance_name: None,
        ship_type_name: None,
        ship_group_name: None,
    })
}

fn parse_attacker(v: &serde_json::Value) -> Result<Participant, String> {
    Ok(Participant {
        character_id: v.get("character_id").and_then(|x| x.as_u64()),
        corporation_id: v.get("corporation_id").and_then(|x| x.as_u64()),
        alliance_id: v.get("alliance_id").and_then(|x| x.as_u64()),
        ship_type_id: v.get("ship_type_id").and_then(|x| x.as_u64()),
        damage_taken: None,
        damage_done: v.get("damage_done").and_then(|x| x.as_u64()),
        final_blow: v.get("final_blow").and_then(|x| x.as_bool()).unwrap_or(false),
        weapon_type_id: v.get("weapon_type_id").and_then(|x| x.as_u64()),
        character_name: None,
        corporation_name: None,
        alliance_name: None,
        ship_type_name: None,
        ship_group_name: None,
    })
}

fn parse_zkb(v: &serde_json::Value) -> Result<ZkbMeta, String> {
    let hash = v.get("hash").and_then(|x| x.as_str()).ok_or("zkb missing hash")?.to_owned();
    Ok(ZkbMeta {
        hash,
        fitted_value: v.get("fittedValue").and_then(|x| x.as_f64()).unwrap_or(0.0),
        total_value: v.get("totalValue").and_then(|x| x.as_f64()).unwrap_or(0.0),
        points: v.get("points").and_then(|x| x.as_u64()).unwrap_or(0) as u32,
        npc: v.get("npc").and_then(|x| x.as_bool()).unwrap_or(false),
        solo: v.get("solo").and_then(|x| x.as_bool()).unwrap_or(false),
        awox: v.get("awox").and_then(|x| x.as_bool()).unwrap_or(false),
        location_id: v.get("locationID").and_then(|x| x.as_u64()),
    })
}
