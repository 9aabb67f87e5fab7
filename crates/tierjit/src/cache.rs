//! Compiled method cache.
//!
//! Stores the best artifact compiled so far for each method, together with
//! its tier. Reads take a shard read lock only; writes go through
//! [`MethodCache::try_upgrade`], which applies the monotonic-upgrade rule
//! under the shard's entry lock.
//!
//! Entries are never evicted.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rustc_hash::FxBuildHasher;

use crate::types::{CompiledMethod, MethodId, Tier};

/// Best compiled artifact for a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Tier the artifact was installed at.
    pub tier: Tier,
    /// The artifact itself.
    pub compiled: Arc<CompiledMethod>,
}

/// Thread-safe method cache with a monotonic-upgrade write rule.
///
/// Cloning is cheap and yields a handle to the same cache.
#[derive(Debug, Clone)]
pub struct MethodCache {
    entries: Arc<DashMap<MethodId, Arc<CacheEntry>, FxBuildHasher>>,
}

impl MethodCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::with_hasher(FxBuildHasher::default())),
        }
    }

    /// Current best entry for a method.
    ///
    /// The returned `Arc` is a complete entry; a later upgrade swaps the map
    /// slot and never touches an entry a reader already holds.
    pub fn lookup(&self, method: MethodId) -> Option<Arc<CacheEntry>> {
        self.entries.get(&method).map(|entry| Arc::clone(entry.value()))
    }

    /// Tier currently cached for a method, `Interpreted` when absent.
    pub fn tier_of(&self, method: MethodId) -> Tier {
        self.entries
            .get(&method)
            .map(|entry| entry.tier)
            .unwrap_or(Tier::Interpreted)
    }

    /// Install `compiled` at `tier` if that is an upgrade.
    ///
    /// Returns `true` if the candidate was installed. The candidate is
    /// discarded when an entry at the same or a higher tier already exists.
    pub fn try_upgrade(&self, method: MethodId, tier: Tier, compiled: CompiledMethod) -> bool {
        let candidate = || {
            Arc::new(CacheEntry {
                tier,
                compiled: Arc::new(compiled),
            })
        };
        match self.entries.entry(method) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().tier >= tier {
                    return false;
                }
                occupied.insert(candidate());
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(candidate());
                true
            }
        }
    }

    /// Number of methods with a compiled artifact.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all entries.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for MethodCache {
    fn default() -> Self {
        Self::new()
    }
}
