// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single templated inverted index, instantiated twice by the registry
//! (`bySystem`, `byCharacter`) instead of the two near-identical
//! implementations the Design Notes call out as a source mixin to collapse
//! (spec §9 Open Questions).

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Maps a filter key (a system id or a character id) to the set of
/// subscription ids interested in it.
#[derive(Debug, Default)]
pub struct InvertedIndex<K: Eq + Hash + Clone> {
    buckets: HashMap<K, HashSet<String>>,
}

impl<K: Eq + Hash + Clone> InvertedIndex<K> {
    pub fn new() -> Self {
        Self { buckets: HashMap::new() }
    }

    pub fn insert(&mut self, key: K, subscription_id: &str) {
        self.buckets.entry(key).or_default().insert(subscription_id.to_owned());
    }

    pub fn remove(&mut self, key: &K, subscription_id: &str) {
        if let Some(bucket) = self.buckets.get_mut(key) {
            bucket.remove(subscription_id);
            if bucket.is_empty() {
                self.buckets.remove(key);
            }
        }
    }

    pub fn members(&self, key: &K) -> HashSet<String> {
        self.buckets.get(key).cloned().unwrap_or_default()
    }

    pub fn contains(&self, key: &K, subscription_id: &str) -> bool {
        self.buckets.get(key).is_some_and(|b| b.contains(subscription_id))
    }
}
