//! Keyed state storage for the rate limiters.
//!
//! # Responsibilities
//! - Hold one state value per key (client IP or API key)
//! - Give a caller exclusive access to a single key's state
//! - Bound memory: cap the number of keys and evict the least recently used
//!
//! # Design Decisions
//! - Each key owns its own mutex; the map lock is only held for lookup
//! - Eviction is approximate LRU: the oldest `last_access` among a small
//!   sample of unlocked slots (in map order) is dropped, so an insert at
//!   capacity costs a bounded amount of work
//! - A slot is only removed while unlocked, and a caller that locked a slot
//!   which has since been removed retries on the live one
//! - An evicted key starts from empty state on its next request

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

/// Result of a rate check: `Err` carries the time until a retry may succeed.
pub type RateDecision = Result<(), Duration>;

/// Storage interface injected into the limiters.
pub trait RateStore<S>: Send + Sync {
    /// Run `op` with exclusive access to `key`'s state, creating it if absent.
    fn with_entry(
        &self,
        key: &str,
        now: Instant,
        op: &mut dyn FnMut(&mut S) -> RateDecision,
    ) -> RateDecision;

    /// Drop every key whose last access is older than `idle_before`.
    /// Returns the number of keys removed.
    fn sweep(&self, idle_before: Instant) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Slot<S> {
    state: S,
    last_access: Instant,
}

/// Unlocked slots inspected per eviction.
const EVICTION_SAMPLE: usize = 16;

/// In-memory store with LRU eviction at a fixed cardinality.
pub struct BoundedStore<S> {
    entries: DashMap<String, Arc<Mutex<Slot<S>>>>,
    max_entries: usize,
}

impl<S: Default + Send> BoundedStore<S> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    fn slot(&self, key: &str, now: Instant) -> Arc<Mutex<Slot<S>>> {
        if let Some(slot) = self.entries.get(key) {
            return Arc::clone(slot.value());
        }

        while self.entries.len() >= self.max_entries {
            if !self.evict_one() {
                break;
            }
        }

        let slot = self.entries.entry(key.to_owned()).or_insert_with(|| {
            Arc::new(Mutex::new(Slot {
                state: S::default(),
                last_access: now,
            }))
        });
        Arc::clone(slot.value())
    }

    /// Whether `slot` is still the one stored under `key`.
    fn is_current(&self, key: &str, slot: &Arc<Mutex<Slot<S>>>) -> bool {
        self.entries
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current.value(), slot))
    }

    fn evict_one(&self) -> bool {
        let victim = self
            .entries
            .iter()
            .filter_map(|entry| {
                let slot = entry.value().try_lock()?;
                Some((entry.key().clone(), Arc::clone(entry.value()), slot.last_access))
            })
            .take(EVICTION_SAMPLE)
            .min_by_key(|(_, _, last_access)| *last_access);

        let Some((key, slot, _)) = victim else {
            return false;
        };
        // Removal happens under the shard lock and only while nobody holds the slot.
        let removed = self
            .entries
            .remove_if(&key, |_, current| {
                Arc::ptr_eq(current, &slot) && current.try_lock().is_some()
            })
            .is_some();
        if removed {
            tracing::debug!(max_entries = self.max_entries, "Evicted least recently used rate-limit entry");
        }
        true
    }
}

impl<S: Default + Send> RateStore<S> for BoundedStore<S> {
    fn with_entry(
        &self,
        key: &str,
        now: Instant,
        op: &mut dyn FnMut(&mut S) -> RateDecision,
    ) -> RateDecision {
        loop {
            let slot = self.slot(key, now);
            let mut guard = slot.lock();
            // Evicted or swept between lookup and lock: start over on the live slot.
            if !self.is_current(key, &slot) {
                continue;
            }
            guard.last_access = now;
            return op(&mut guard.state);
        }
    }

    fn sweep(&self, idle_before: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, slot| match slot.try_lock() {
            Some(slot) => slot.last_access >= idle_before,
            None => true,
        });
        before.saturating_sub(self.entries.len())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
