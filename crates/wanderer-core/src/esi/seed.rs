// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup CSV seeding of `esi_type`/`esi_group` (spec §4.3, §6). Seeding is
//! advisory: a missing directory or malformed file is logged and the
//! resolver simply falls back to network lookups.

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::esi::resolver::{EsiEntity, EsiResolver};
use crate::store::Namespace;

/// Required columns `typeID, typeName, groupID`; others are ignored.
#[derive(Debug, Deserialize)]
struct TypeRow {
    #[serde(rename = "typeID")]
    type_id: u64,
    #[serde(rename = "typeName")]
    type_name: String,
    #[serde(rename = "groupID")]
    group_id: u64,
}

/// Required columns `groupID, groupName`; others are ignored.
#[derive(Debug, Deserialize)]
struct GroupRow {
    #[serde(rename = "groupID")]
    group_id: u64,
    #[serde(rename = "groupName")]
    group_name: String,
}

/// Load `types.csv` and `groups.csv` from `dir` into the resolver's cache.
/// Each file's absence or parse failure is logged and skipped independently.
pub async fn seed_from_dir(resolver: &EsiResolver, dir: &Path) {
    seed_types(resolver, &dir.join("types.csv")).await;
    seed_groups(resolver, &dir.join("groups.csv")).await;
}

async fn seed_types(resolver: &EsiResolver, path: &Path) {
    let mut reader = match csv::Reader::from_path(path) {
        Ok(r) => r,
        Err(e) => {
            warn!(path = %path.display(), err = %e, "ship type seed file unavailable, falling back to network");
            return;
        }
    };

    let mut loaded = 0usize;
    for record in reader.deserialize::<TypeRow>() {
        let row = match record {
            Ok(row) => row,
            Err(e) => {
                warn!(err = %e, "skipping malformed ship type row");
                continue;
            }
        };
        let entity = EsiEntity { name: row.type_name, group_id: Some(row.group_id) };
        if resolver.seed(Namespace::EsiType, row.type_id, &entity).await.is_ok() {
            loaded += 1;
        }
    }
    tracing::info!(loaded, path = %path.display(), "seeded ship types");
}

async fn seed_groups(resolver: &EsiResolver, path: &Path) {
    let mut reader = match csv::Reader::from_path(path) {
        Ok(r) => r,
        Err(e) => {
            warn!(path = %path.display(), err = %e, "ship group seed file unavailable, falling back to network");
            return;
        }
    };

    let mut loaded = 0usize;
    for record in reader.deserialize::<GroupRow>() {
        let row = match record {
            Ok(row) => row,
            Err(e) => {
                warn!(err = %e, "skipping malformed ship group row");
                continue;
            }
        };
        let entity = EsiEntity { name: row.group_name, group_id: None };
        if resolver.seed(Namespace::EsiGroup, row.group_id, &entity).await.is_ok() {
            loaded += 1;
        }
    }
    tracing::info!(loaded, path = %path.display(), "seeded ship groups");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_fetcher::HttpFetcher;
    use crate::store::Store;
    use std::io::Write;
    use std::sync::Arc;

    #[tokio::test]
    async fn seeds_types_and_groups_from_csv() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut types = std::fs::File::create(dir.path().join("types.csv")).expect("create");
        writeln!(types, "typeID,typeName,groupID").expect("write");
        writeln!(types, "587,Rifter,25").expect("write");
        let mut groups = std::fs::File::create(dir.path().join("groups.csv")).expect("create");
        writeln!(groups, "groupID,groupName").expect("write");
        writeln!(groups, "25,Frigate").expect("write");

        let store = Arc::new(Store::new());
        let fetcher = HttpFetcher::new(1000, 100, 10);
        let resolver = EsiResolver::new(store, fetcher, "https://esi.example".into());
        seed_from_dir(&resolver, dir.path()).await;

        let ty = resolver.get_type(587).await.expect("seeded type");
        assert_eq!(ty.name, "Rifter");
        let group = resolver.get_group(25).await.expect("seeded group");
        assert_eq!(group.name, "Frigate");
    }

    #[tokio::test]
    async fn missing_directory_is_advisory_only() {
        let store = Arc::new(Store::new());
        let fetcher = HttpFetcher::new(1000, 100, 10);
        let resolver = EsiResolver::new(store, fetcher, "https://esi.example".into());
        // Must not panic even though the directory doesn't exist.
        seed_from_dir(&resolver, Path::new("/nonexistent/seed/dir")).await;
    }
}
