//! TTL index for expiration sweeps
//!
//! Maps expiry timestamp → set of keys so a sweep only touches keys that are
//! due, O(expired count) instead of O(all keys).
//!
//! The index is a hint: an overwritten key may leave an old entry behind.
//! Eviction always re-checks the entry's own expiry before removing it.

use canvass_core::Timestamp;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;

/// TTL index: expiry_timestamp → keys
#[derive(Debug, Default)]
pub struct TtlIndex {
    index: BTreeMap<Timestamp, FxHashSet<String>>,
}

impl TtlIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key expiring at `expires_at`
    pub fn insert(&mut self, expires_at: Timestamp, key: &str) {
        self.index
            .entry(expires_at)
            .or_default()
            .insert(key.to_string());
    }

    /// Forget a key registered at `expires_at`
    ///
    /// Removes the timestamp bucket once it is empty.
    pub fn remove(&mut self, expires_at: Timestamp, key: &str) {
        if let Some(keys) = self.index.get_mut(&expires_at) {
            keys.remove(key);
            if keys.is_empty() {
                self.index.remove(&expires_at);
            }
        }
    }

    /// Keys whose expiry is at or before `now`
    pub fn find_expired(&self, now: Timestamp) -> Vec<String> {
        self.index
            .range(..=now)
            .flat_map(|(_, keys)| keys.iter().cloned())
            .collect()
    }

    /// Drop every bucket at or before `now`; returns entries removed
    pub fn remove_expired(&mut self, now: Timestamp) -> usize {
        let due: Vec<Timestamp> = self.index.range(..=now).map(|(ts, _)| *ts).collect();
        due.into_iter()
            .filter_map(|ts| self.index.remove(&ts))
            .map(|keys| keys.len())
            .sum()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Total number of registered keys
    pub fn len(&self) -> usize {
        self.index.values().map(|keys| keys.len()).sum()
    }
}
