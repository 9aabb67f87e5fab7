//! Invocation counter for tiering decisions.
//!
//! Tracks how many times each method has been invoked. The dispatcher
//! compares the count against the promotion thresholds to decide when a
//! method becomes a compilation candidate.
//!
//! Counts are a heuristic. `Relaxed` ordering is enough: a caller may see a
//! slightly stale value, which only delays a threshold crossing by a call or
//! two, but a counter never goes backwards.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

use crate::types::MethodId;

/// Thread-safe per-method invocation counter.
///
/// Counts live in a sharded map of `AtomicU64`. An already-seen method is
/// bumped under its shard's read lock; the first call of a method takes
/// only that shard's write lock, so unrelated methods never wait on it.
#[derive(Debug)]
pub struct HotnessTracker {
    counts: DashMap<MethodId, AtomicU64, FxBuildHasher>,
}

impl HotnessTracker {
    pub fn new() -> Self {
        Self {
            counts: DashMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Increment the invocation count for a method. Returns the count
    /// before this call.
    pub fn increment(&self, method: MethodId) -> u64 {
        if let Some(count) = self.counts.get(&method) {
            return count.fetch_add(1, Ordering::Relaxed);
        }

        // Another caller may insert between the miss and the entry lock;
        // `or_insert_with` keeps whichever counter got there first.
        self.counts
            .entry(method)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed)
    }

    /// Get the current invocation count for a method.
    pub fn get(&self, method: MethodId) -> u64 {
        self.counts
            .get(&method)
            .map(|count| count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Number of methods seen so far.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Seed a method's count, e.g. to start a test from an already-hot method.
    ///
    /// Never lowers an existing count.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn warm(&self, method: MethodId, count: u64) {
        self.counts
            .entry(method)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_max(count, Ordering::Relaxed);
    }

    /// Remove all invocation counts.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn clear(&self) {
        self.counts.clear();
    }
}

impl Default for HotnessTracker {
    fn default() -> Self {
        Self::new()
    }
}
