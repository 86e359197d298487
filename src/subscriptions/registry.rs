//! Subscription Registry
//!
//! Authoritative set of watched deployment ids plus the last observed state
//! of each. Every operation is atomic per id: the map is a `DashMap`, so a
//! subscribe on one id never contends with a state update on another.

use crate::models::{ResourceState, SubscriptionEntry};
use crate::utils::now_utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Placeholder id tools produce when a response carries no id.
pub const UNKNOWN_ID: &str = "Unknown";

/// Result of a subscribe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    AlreadySubscribed,
    /// Empty or placeholder id; nothing was stored.
    Rejected,
}

impl SubscribeOutcome {
    pub fn already_subscribed(&self) -> bool {
        matches!(self, SubscribeOutcome::AlreadySubscribed)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, SubscribeOutcome::Rejected)
    }
}

struct Slot {
    /// Insertion sequence, used to keep `list()` in subscription order
    seq: u64,
    entry: SubscriptionEntry,
}

/// Whether `id` may be stored in the registry.
pub fn is_valid_target(id: &str) -> bool {
    let trimmed = id.trim();
    !trimmed.is_empty() && trimmed != UNKNOWN_ID
}

/// Thread-safe registry of watched deployments.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    slots: Arc<DashMap<String, Slot>>,
    next_seq: Arc<AtomicU64>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            next_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Add `id` to the watched set.
    ///
    /// Surrounding whitespace is stripped before the id is stored.
    /// Re-subscribing an existing id leaves its entry (including the cached
    /// baseline) untouched.
    pub fn subscribe(&self, id: &str, via: Option<&str>) -> SubscribeOutcome {
        let id = id.trim();
        if !is_valid_target(id) {
            return SubscribeOutcome::Rejected;
        }

        match self.slots.entry(id.to_string()) {
            Entry::Occupied(_) => SubscribeOutcome::AlreadySubscribed,
            Entry::Vacant(vacant) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                vacant.insert(Slot {
                    seq,
                    entry: SubscriptionEntry {
                        id: id.to_string(),
                        last_state: None,
                        subscribed_at: now_utc(),
                        subscribed_via: via.map(str::to_string),
                    },
                });
                SubscribeOutcome::Subscribed
            }
        }
    }

    /// Remove `id`, discarding its cached state. Returns whether it was present.
    pub fn unsubscribe(&self, id: &str) -> bool {
        self.slots.remove(id).is_some()
    }

    /// Remove every entry and return how many were removed.
    pub fn clear_all(&self) -> usize {
        let ids: Vec<String> = self.slots.iter().map(|slot| slot.key().clone()).collect();
        ids.iter().filter(|id| self.slots.remove(*id).is_some()).count()
    }

    /// Watched ids in the order they were subscribed.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<(u64, String)> = self
            .slots
            .iter()
            .map(|slot| (slot.value().seq, slot.key().clone()))
            .collect();
        ids.sort_by_key(|(seq, _)| *seq);
        ids.into_iter().map(|(_, id)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    /// Last observed state of `id`, if subscribed and a baseline exists.
    pub fn snapshot(&self, id: &str) -> Option<ResourceState> {
        self.slots
            .get(id)
            .and_then(|slot| slot.value().entry.last_state.clone())
    }

    /// Full entry for `id`, for status reporting.
    pub fn entry(&self, id: &str) -> Option<SubscriptionEntry> {
        self.slots.get(id).map(|slot| slot.value().entry.clone())
    }

    /// Record a freshly fetched state for `id` and hand back the previous one.
    ///
    /// Returns `None` when `id` is no longer subscribed (the result is
    /// discarded), otherwise `Some(previous)` where `previous` is `None` if
    /// this is the first observation. The swap happens under the entry's
    /// lock, so the caller compares against exactly the state it replaced.
    pub fn replace_state(&self, id: &str, state: ResourceState) -> Option<Option<ResourceState>> {
        self.slots
            .get_mut(id)
            .map(|mut slot| slot.entry.last_state.replace(state))
    }

    /// Store `state` as baseline only if `id` has none yet.
    ///
    /// Used by tools that already hold a fresh payload for the deployment.
    /// Returns whether the baseline was stored.
    pub fn seed_baseline(&self, id: &str, state: ResourceState) -> bool {
        match self.slots.get_mut(id) {
            Some(mut slot) if slot.entry.last_state.is_none() => {
                slot.entry.last_state = Some(state);
                true
            }
            _ => false,
        }
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
