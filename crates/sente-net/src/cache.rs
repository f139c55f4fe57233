//! Position-keyed cache of network results.
//!
//! Sharded by hash; each shard is a `HashMap` plus a FIFO queue of keys that
//! decides eviction order. Inserting a key that is already present does
//! nothing, so re-inserting a result never reorders eviction.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use sente_core::{GameState, Symmetry};
use tracing::debug;

use crate::result::NetResult;

/// Smallest cache, in entries.
pub const MIN_CACHE_ENTRIES: usize = 6_000;
/// Largest cache, in entries.
pub const MAX_CACHE_ENTRIES: usize = 150_000;

const SHARDS: usize = 16;

// ── Compile-time assertion: shared between evaluation threads ──────────────
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn check() {
        assert_send_sync::<ResultCache>();
    }
    let _ = check;
};

/// Cache capacity for a search of `max_playouts` playouts.
pub fn capacity_for_playouts(max_playouts: usize) -> usize {
    max_playouts
        .saturating_mul(3)
        .clamp(MIN_CACHE_ENTRIES, MAX_CACHE_ENTRIES)
}

struct Shard {
    entries: HashMap<u64, NetResult>,
    order: VecDeque<u64>,
    capacity: usize,
}

impl Shard {
    fn insert(&mut self, hash: u64, result: &NetResult) -> bool {
        if self.entries.contains_key(&hash) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(hash, result.clone());
        self.order.push_back(hash);
        true
    }
}

/// Thread-safe FIFO cache of [`NetResult`]s keyed by position hash.
pub struct ResultCache {
    shards: Vec<Mutex<Shard>>,
    capacity: usize,
    hits: AtomicU64,
    lookups: AtomicU64,
    inserts: AtomicU64,
}

impl ResultCache {
    /// Create a cache holding about `capacity` entries.
    pub fn new(capacity: usize) -> ResultCache {
        let capacity = capacity.max(SHARDS);
        let per_shard = capacity.div_ceil(SHARDS);
        debug!(capacity, shards = SHARDS, "allocating result cache");
        ResultCache {
            shards: (0..SHARDS)
                .map(|_| {
                    Mutex::new(Shard {
                        entries: HashMap::new(),
                        order: VecDeque::with_capacity(per_shard),
                        capacity: per_shard,
                    })
                })
                .collect(),
            capacity,
            hits: AtomicU64::new(0),
            lookups: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
        }
    }

    /// Sized from the expected playouts per search.
    pub fn for_playouts(max_playouts: usize) -> ResultCache {
        ResultCache::new(capacity_for_playouts(max_playouts))
    }

    #[inline]
    fn shard(&self, hash: u64) -> &Mutex<Shard> {
        &self.shards[(hash as usize) & (SHARDS - 1)]
    }

    /// Exact lookup by hash.
    pub fn lookup(&self, hash: u64) -> Option<NetResult> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let found = self
            .shard(hash)
            .lock()
            .expect("cache shard mutex poisoned")
            .entries
            .get(&hash)
            .cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Store `result` under `hash` unless the key is already present.
    pub fn insert(&self, hash: u64, result: &NetResult) {
        let inserted = self
            .shard(hash)
            .lock()
            .expect("cache shard mutex poisoned")
            .insert(hash, result);
        if inserted {
            self.inserts.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Look up `state`, then (if allowed) its seven symmetric images.
    ///
    /// A hit on the image under symmetry `s` stored the policy of a board
    /// whose stone at `v` sits at `table[s][v]` here, so the returned policy
    /// reads `stored[table[s][i]]` for vertex `i`.
    pub fn probe(&self, state: &impl GameState, allow_symmetries: bool) -> Option<NetResult> {
        if let Some(hit) = self.lookup(state.hash()) {
            return Some(hit);
        }
        if !allow_symmetries {
            return None;
        }
        Symmetry::ALL[1..].iter().find_map(|&symmetry| {
            self.lookup(state.symmetry_hash(symmetry))
                .map(|stored| stored.permuted(symmetry))
        })
    }

    /// Configured capacity in entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries currently stored.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().expect("cache shard mutex poisoned").entries.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counters accumulated since creation.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
        }
    }

    /// Log the counters at debug level.
    pub fn dump_stats(&self) {
        let stats = self.stats();
        debug!(
            hits = stats.hits,
            lookups = stats.lookups,
            inserts = stats.inserts,
            hit_rate = stats.hit_rate(),
            entries = self.len(),
            "result cache statistics"
        );
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub lookups: u64,
    pub inserts: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, 0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use sente_core::{NUM_INTERSECTIONS, Position, SymmetryTable, Vertex};

    use super::*;

    fn result(tag: f32) -> NetResult {
        let mut r = NetResult::default();
        r.winrate = tag;
        r
    }

    #[test]
    fn capacity_is_clamped() {
        assert_eq!(capacity_for_playouts(0), MIN_CACHE_ENTRIES);
        assert_eq!(capacity_for_playouts(10_000), 30_000);
        assert_eq!(capacity_for_playouts(usize::MAX), MAX_CACHE_ENTRIES);
    }

    #[test]
    fn insert_then_lookup() {
        let cache = ResultCache::new(64);
        assert!(cache.lookup(42).is_none());
        cache.insert(42, &result(0.25));
        assert_eq!(cache.lookup(42).map(|r| r.winrate), Some(0.25));
        assert_eq!(cache.stats(), CacheStats { hits: 1, lookups: 2, inserts: 1 });
    }

    #[test]
    fn reinsert_does_not_overwrite() {
        let cache = ResultCache::new(64);
        cache.insert(7, &result(0.1));
        cache.insert(7, &result(0.9));
        assert_eq!(cache.lookup(7).map(|r| r.winrate), Some(0.1));
        assert_eq!(cache.stats().inserts, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn oldest_entry_is_evicted_first() {
        // 16 shards of one entry; keys 0, 16, 32 share shard 0.
        let cache = ResultCache::new(16);
        cache.insert(0, &result(0.0));
        cache.insert(16, &result(0.16));
        assert!(cache.lookup(0).is_none(), "first entry should be evicted");
        assert!(cache.lookup(16).is_some());
        cache.insert(16, &result(0.5));
        cache.insert(32, &result(0.32));
        assert!(cache.lookup(16).is_none());
        assert_eq!(cache.lookup(32).map(|r| r.winrate), Some(0.32));
    }

    #[test]
    fn probe_finds_symmetric_position_and_permutes_policy() {
        let mut stored_pos = Position::default();
        stored_pos.play(Vertex::from_coordinate("C4").unwrap()).unwrap();

        let cache = ResultCache::new(1024);
        let mut stored = result(0.6);
        stored.policy_pass = 0.05;
        let c4 = Vertex::from_coordinate("C4").unwrap().index();
        let d17 = Vertex::from_coordinate("D17").unwrap().index();
        stored.policy[d17] = 0.9;
        stored.policy[c4] = 0.01;
        cache.insert(stored_pos.hash(), &stored);

        let table = SymmetryTable::get();
        for &sym in &Symmetry::ALL[1..] {
            // Find the image of `stored_pos` that `sym` maps back onto it.
            let query = Symmetry::ALL
                .iter()
                .map(|&inv| stored_pos.transformed(inv))
                .find(|q| q.symmetry_hash(sym) == stored_pos.hash())
                .expect("every symmetry has an inverse");
            assert_ne!(query.hash(), stored_pos.hash(), "C4 has no stabilizing symmetry");

            assert!(cache.probe(&query, false).is_none(), "exact probe must miss");
            let hit = cache.probe(&query, true).expect("symmetric probe should hit");
            assert_eq!(hit.winrate, 0.6);
            assert_eq!(hit.policy_pass, 0.05);
            for i in 0..NUM_INTERSECTIONS {
                assert_eq!(hit.policy[i], stored.policy[table.map_index(sym, i)]);
            }
            // The stone's own point maps back onto C4.
            let c4_here = (0..NUM_INTERSECTIONS)
                .find(|&i| table.map_index(sym, i) == c4)
                .unwrap();
            assert_eq!(hit.policy[c4_here], 0.01);
        }
    }

    #[test]
    fn probe_without_symmetries_is_exact_only() {
        let cache = ResultCache::new(64);
        let pos = Position::default();
        cache.insert(pos.hash(), &result(0.5));
        assert!(cache.probe(&pos, false).is_some());
    }
}
