//! LRU store for normalized companies

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use super::key::CacheKey;
use crate::model::Company;

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub capacity: usize,
}

struct Slot {
    company: Company,
    /// Position in the recency order
    tick: u64,
}

/// Recency-ordered entries. `order` maps each slot's tick back to its key,
/// so the least recently used entry is always the first one in `order`.
#[derive(Default)]
struct LruState {
    entries: HashMap<CacheKey, Slot>,
    order: BTreeMap<u64, CacheKey>,
    next_tick: u64,
}

impl LruState {
    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }
}

/// Capacity-bounded company cache with least-recently-used eviction.
///
/// Only successful normalizations are ever stored here.
pub struct CompanyCache {
    capacity: NonZeroUsize,
    state: Mutex<LruState>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CompanyCache {
    /// Create a new cache holding at most `capacity` companies
    pub fn new(capacity: NonZeroUsize) -> Self {
        info!("Initializing company cache (capacity: {})", capacity);

        Self {
            capacity,
            state: Mutex::new(LruState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a company, marking it as most recently used
    pub fn get(&self, key: &CacheKey) -> Option<Company> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let tick = state.bump();

        let found = match state.entries.get_mut(key) {
            Some(slot) => {
                let previous = std::mem::replace(&mut slot.tick, tick);
                Some((previous, slot.company.clone()))
            }
            None => None,
        };

        match found {
            Some((previous, company)) => {
                state.order.remove(&previous);
                state.order.insert(tick, key.clone());
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(company)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace a company, evicting the least recently used entry
    /// when the cache is full
    pub fn put(&self, key: CacheKey, company: Company) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let tick = state.bump();

        if let Some(slot) = state.entries.get_mut(&key) {
            let previous = std::mem::replace(&mut slot.tick, tick);
            slot.company = company;
            state.order.remove(&previous);
            state.order.insert(tick, key);
            return;
        }

        if state.entries.len() >= self.capacity.get()
            && let Some((_, oldest)) = state.order.pop_first()
        {
            debug!("Evicting cache entry: {}", oldest);
            state.entries.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }

        state.order.insert(tick, key.clone());
        state.entries.insert(key, Slot { company, tick });
    }

    /// Look up a company without touching its recency or the hit counters
    pub fn peek(&self, key: &CacheKey) -> Option<Company> {
        self.state
            .lock()
            .entries
            .get(key)
            .map(|slot| slot.company.clone())
    }

    /// Check for an entry without touching its recency or the hit counters
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
            capacity: self.capacity.get(),
        }
    }
}
