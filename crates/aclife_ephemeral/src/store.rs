//! Sharded TTL key/value store.
//!
//! Keys hash onto a fixed set of independently locked shards, so operations
//! on different keys rarely contend and no operation ever locks the whole
//! store. Expired entries are invisible to readers as soon as their age
//! reaches the TTL; physical removal happens on the next [`TtlStore::purge_expired`].

use crate::sweeper::Sweep;
use parking_lot::RwLock;
use std::collections::hash_map::{Entry, RandomState};
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_SHARDS: usize = 16;

struct Slot<V> {
    value: V,
    written_at: Instant,
}

impl<V> Slot<V> {
    fn new(value: V, now: Instant) -> Self {
        Self {
            value,
            written_at: now,
        }
    }

    fn is_live(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.written_at) < ttl
    }
}

type Shard<K, V> = RwLock<HashMap<K, Slot<V>>>;

/// A concurrent key/value store whose entries expire a fixed time after
/// they were last written.
///
/// Values are replaced wholesale; in-place mutation of a value needs its own
/// synchronization (see [`crate::RateLimiter`]).
pub struct TtlStore<K, V> {
    shards: Box<[Shard<K, V>]>,
    hasher: RandomState,
    ttl: Duration,
}

impl<K, V> TtlStore<K, V>
where
    K: Eq + Hash,
{
    /// Creates a store with the given TTL and the default shard count.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_shards(ttl, DEFAULT_SHARDS)
    }

    /// Creates a store with an explicit shard count (at least one).
    #[must_use]
    pub fn with_shards(ttl: Duration, shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Self {
            shards,
            hasher: RandomState::new(),
            ttl,
        }
    }

    /// Returns the time-to-live applied to every entry.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn shard(&self, key: &K) -> &Shard<K, V> {
        let index = (self.hasher.hash_one(key) % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    /// Stores a value, replacing any previous one and restarting its TTL.
    pub fn insert(&self, key: K, value: V) {
        let now = Instant::now();
        self.shard(&key).write().insert(key, Slot::new(value, now));
    }

    /// Removes and returns the live value for `key`.
    ///
    /// Lookup and removal happen under one shard lock, so of several
    /// concurrent callers at most one receives the value.
    pub fn remove(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let slot = self.shard(key).write().remove(key)?;
        slot.is_live(now, self.ttl).then_some(slot.value)
    }

    /// Restarts the TTL of a live entry. Returns false if there was none.
    pub fn touch(&self, key: &K) -> bool {
        let now = Instant::now();
        let mut shard = self.shard(key).write();
        match shard.get_mut(key) {
            Some(slot) if slot.is_live(now, self.ttl) => {
                slot.written_at = now;
                true
            }
            _ => false,
        }
    }

    /// Keeps only the entries for which `keep` returns true.
    ///
    /// Each shard is write-locked while it is visited. Returns the number of
    /// entries removed.
    pub fn retain(&self, mut keep: impl FnMut(&K, &mut V) -> bool) -> usize {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut shard = shard.write();
            let before = shard.len();
            shard.retain(|key, slot| keep(key, &mut slot.value));
            removed += before - shard.len();
        }
        removed
    }

    /// Physically removes every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut shard = shard.write();
            let before = shard.len();
            shard.retain(|_, slot| slot.is_live(now, ttl));
            removed += before - shard.len();
        }
        removed
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }
}

impl<K, V> TtlStore<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Returns a clone of the live value for `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let shard = self.shard(key).read();
        shard
            .get(key)
            .filter(|slot| slot.is_live(now, self.ttl))
            .map(|slot| slot.value.clone())
    }

    /// Returns the live value for `key`, inserting `make()` if there is none.
    ///
    /// An expired entry is replaced as if it were absent.
    pub fn get_or_insert_with(&self, key: K, make: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(&key) {
            return value;
        }

        let now = Instant::now();
        let mut shard = self.shard(&key).write();
        match shard.entry(key) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_live(now, self.ttl) {
                    occupied.insert(Slot::new(make(), now));
                }
                occupied.get().value.clone()
            }
            Entry::Vacant(vacant) => vacant.insert(Slot::new(make(), now)).value.clone(),
        }
    }
}

impl<K, V> Sweep for TtlStore<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn sweep(&self) -> usize {
        self.purge_expired()
    }
}

impl<K, V> std::fmt::Debug for TtlStore<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlStore")
            .field("ttl", &self.ttl)
            .field("shards", &self.shards.len())
            .field("len", &self.len())
            .finish()
    }
}
