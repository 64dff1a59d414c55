//! In-process TTL key/value store backing the ephemeral auth maps.
//!
//! CSRF pairings, dedup entries, and rate-limit windows all share the same
//! shape: keyed values that expire and are reconstructed from scratch on
//! restart. `TtlMap` gives them one store-agnostic capability with
//! `get/insert/remove/sweep_expired`. Expiry is enforced on read as well as
//! by the periodic sweep, so an expired entry is never returned as valid
//! between sweeps.

use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

pub struct TtlMap<K, V> {
    entries: DashMap<K, Entry<V>>,
}

impl<K, V> TtlMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Return the live value for `key`, dropping it if it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if now < entry.expires_at {
                return Some(entry.value.clone());
            }
        }
        // Lazy expiry: remove only when confirmed stale under the shard lock.
        self.entries
            .remove_if(key, |_, entry| now >= entry.expires_at);
        None
    }

    /// Insert only if no live entry exists. Returns `true` when this call
    /// won the slot; concurrent callers for the same key are serialized by
    /// the map shard, so exactly one caller sees `true`.
    pub fn insert_if_absent(&self, key: K, value: V, ttl: Duration) -> bool {
        let now = Instant::now();
        match self.entries.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if now < occupied.get().expires_at {
                    return false;
                }
                occupied.insert(Entry {
                    value,
                    expires_at: now + ttl,
                });
                true
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Entry {
                    value,
                    expires_at: now + ttl,
                });
                true
            }
        }
    }

    pub fn remove(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Delete entries past their expiry. Safe to run concurrently with
    /// readers; both sides compare against a fresh `Instant`.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before - self.entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Default for TtlMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
