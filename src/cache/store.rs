//! Cost-weighted LRU store with eviction veto.

use crate::cache::types::{CacheStats, Eviction, TileKey};
use crate::tile::TileEntry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::trace;

/// Default cost budget for the shared tile cache, in bytes.
///
/// Note: we get into trouble if the tiles visible on screen actually use
/// more space than that. The cache is allowed to grow past its limit while
/// the resident entries are still in use.
pub const DEFAULT_CACHE_BUDGET: usize = 256 * (1 << 20);

static GLOBAL: OnceLock<Mutex<TileCache>> = OnceLock::new();

struct Slot {
    tile: Arc<Mutex<TileEntry>>,
    cost: usize,
    last_used: u64,
}

/// Keyed tile store bounded by a total byte cost.
///
/// Entries are evicted in LRU order once the budget is exceeded, but every
/// candidate is first asked via [`TileEntry::on_evict`]; an entry with an
/// in-flight decode worker, or whose payload hook answers
/// [`Eviction::Keep`], stays resident and the evictor moves on. When every
/// entry vetoes, the cache stays over budget.
pub struct TileCache {
    entries: HashMap<TileKey, Slot>,
    budget: usize,
    used: usize,
    tick: u64,
    stats: CacheStats,
}

impl TileCache {
    /// Create a cache bounded by `budget` bytes.
    pub fn new(budget: usize) -> Self {
        Self {
            entries: HashMap::new(),
            budget,
            used: 0,
            tick: 0,
            stats: CacheStats::default(),
        }
    }

    /// The process-wide cache shared by all surveys, created on first use.
    pub fn global() -> &'static Mutex<TileCache> {
        GLOBAL.get_or_init(|| Mutex::new(TileCache::new(DEFAULT_CACHE_BUDGET)))
    }

    /// Look up a tile, marking it most-recently used.
    pub fn get(&mut self, key: &TileKey) -> Option<Arc<Mutex<TileEntry>>> {
        self.tick += 1;
        let tick = self.tick;
        match self.entries.get_mut(key) {
            Some(slot) => {
                slot.last_used = tick;
                self.stats.hits += 1;
                Some(slot.tile.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Insert a tile with the given cost, evicting LRU entries as needed.
    ///
    /// Replaces any previous entry under the same key, so the cache holds
    /// at most one entry per key. Returns a shared handle to the inserted
    /// entry.
    pub fn insert(&mut self, key: TileKey, tile: TileEntry, cost: usize) -> Arc<Mutex<TileEntry>> {
        self.tick += 1;
        let handle = Arc::new(Mutex::new(tile));
        let slot = Slot {
            tile: handle.clone(),
            cost,
            last_used: self.tick,
        };
        if let Some(old) = self.entries.insert(key, slot) {
            self.used -= old.cost;
        }
        self.used += cost;
        self.evict_over_budget();
        handle
    }

    /// Adjust an entry's cost after the fact (when a decode completes and
    /// the true payload size becomes known).
    pub fn set_cost(&mut self, key: &TileKey, cost: usize) {
        if let Some(slot) = self.entries.get_mut(key) {
            self.used = self.used - slot.cost + cost;
            slot.cost = cost;
            self.evict_over_budget();
        }
    }

    /// Whether a key is resident.
    pub fn contains(&self, key: &TileKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total cost of resident entries, in bytes.
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    /// The configured cost budget, in bytes.
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Behavior counters.
    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }

    /// Evict LRU entries until the cache fits its budget or every
    /// remaining entry vetoes.
    fn evict_over_budget(&mut self) {
        if self.used <= self.budget {
            return;
        }
        let mut candidates: Vec<(TileKey, u64)> = self
            .entries
            .iter()
            .map(|(k, slot)| (*k, slot.last_used))
            .collect();
        candidates.sort_by_key(|&(_, last_used)| last_used);

        for (key, _) in candidates {
            if self.used <= self.budget {
                break;
            }
            let verdict = {
                let slot = &self.entries[&key];
                slot.tile.lock().unwrap().on_evict()
            };
            match verdict {
                Eviction::Keep => {
                    self.stats.vetoes += 1;
                }
                Eviction::Drop => {
                    if let Some(slot) = self.entries.remove(&key) {
                        self.used -= slot.cost;
                        self.stats.evictions += 1;
                        trace!(survey = key.survey, order = key.order, pix = key.pix, "evicted tile");
                    }
                }
            }
        }
    }
}
