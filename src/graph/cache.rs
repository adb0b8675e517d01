//! Memoizing decorator over prerequisite lookups.
//!
//! [`CachedLookup`] wraps any [`PrerequisiteLookup`] and caches immediate
//! prerequisite and dependent sets in concurrent `DashMap`s. Entries expire
//! after the configured TTL. When the map reaches capacity it is cleared
//! wholesale. Errors are never cached.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::policy::CachePolicy;

use super::index::GraphResult;
use super::{NodeId, PrerequisiteLookup};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: BTreeSet<NodeId>,
    stored_at: Instant,
}

/// Hit/miss counters and current size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Caching wrapper around a prerequisite lookup.
///
/// Mutating the wrapped graph through [`CachedLookup::inner_mut`] drops
/// every cached entry.
#[derive(Debug)]
pub struct CachedLookup<L> {
    inner: L,
    enabled: bool,
    capacity: usize,
    ttl: Option<Duration>,
    prerequisites: DashMap<NodeId, CacheEntry>,
    dependents: DashMap<NodeId, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<L: PrerequisiteLookup> CachedLookup<L> {
    /// Wrap `inner` with the default cache policy.
    pub fn new(inner: L) -> Self {
        Self::with_policy(inner, &CachePolicy::default())
    }

    pub fn with_policy(inner: L, policy: &CachePolicy) -> Self {
        Self {
            inner,
            enabled: policy.enabled && policy.capacity > 0,
            capacity: policy.capacity,
            ttl: (policy.ttl_secs > 0).then(|| Duration::from_secs(policy.ttl_secs)),
            prerequisites: DashMap::new(),
            dependents: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Mutable access to the wrapped lookup. Invalidates the cache.
    pub fn inner_mut(&mut self) -> &mut L {
        self.invalidate();
        &mut self.inner
    }

    pub fn into_inner(self) -> L {
        self.inner
    }

    /// Drop every cached entry.
    pub fn invalidate(&self) {
        self.prerequisites.clear();
        self.dependents.clear();
    }

    /// Drop cached entries for one node.
    pub fn invalidate_node(&self, node_id: &str) {
        self.prerequisites.remove(node_id);
        self.dependents.remove(node_id);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.prerequisites.len() + self.dependents.len(),
        }
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        self.ttl
            .is_none_or(|ttl| entry.stored_at.elapsed() < ttl)
    }

    fn cached(
        &self,
        map: &DashMap<NodeId, CacheEntry>,
        node_id: &str,
        load: impl FnOnce(&L, &str) -> GraphResult<BTreeSet<NodeId>>,
    ) -> GraphResult<BTreeSet<NodeId>> {
        if !self.enabled {
            return load(&self.inner, node_id);
        }

        let fresh = map
            .get(node_id)
            .filter(|entry| self.is_fresh(entry))
            .map(|entry| entry.value.clone());
        if let Some(value) = fresh {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = load(&self.inner, node_id)?;
        if map.len() >= self.capacity {
            tracing::debug!(capacity = self.capacity, "lookup cache full, clearing");
            map.clear();
        }
        map.insert(
            node_id.to_string(),
            CacheEntry {
                value: value.clone(),
                stored_at: Instant::now(),
            },
        );
        Ok(value)
    }
}

impl<L: PrerequisiteLookup> PrerequisiteLookup for CachedLookup<L> {
    fn prerequisites(&self, node_id: &str) -> GraphResult<BTreeSet<NodeId>> {
        self.cached(&self.prerequisites, node_id, |inner, id| {
            inner.prerequisites(id)
        })
    }

    fn dependents(&self, node_id: &str) -> GraphResult<BTreeSet<NodeId>> {
        self.cached(&self.dependents, node_id, |inner, id| inner.dependents(id))
    }
}
