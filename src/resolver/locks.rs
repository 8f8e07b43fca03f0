//! Pending-creation lock set.
//!
//! The sole explicit mutual-exclusion primitive in the core: at most one
//! creation attempt proceeds per (source id, mirror workspace) key at a time.
//! The lock is advisory; a contended acquire means "retry later", never
//! permanent failure. Leaks are handled by the maintenance sweep's size-based
//! force clear rather than a per-entry TTL.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::models::MappingKey;

/// Exclusive in-flight creation tokens keyed by (source id, mirror workspace)
#[derive(Debug, Clone, Default)]
pub struct PendingCreationLocks {
    held: Arc<DashMap<MappingKey, Instant>>,
}

impl PendingCreationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the lock for a key.
    ///
    /// Returns `None` when another creation attempt is already in flight.
    /// The guard releases on every exit path, including panic unwind.
    pub fn acquire(&self, key: MappingKey) -> Option<PendingCreationGuard> {
        match self.held.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                vacant.insert(Instant::now());
                Some(PendingCreationGuard {
                    held: Arc::clone(&self.held),
                    key,
                })
            }
        }
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Drop every held token. Leak guard only; a guard dropped after this may
    /// release a token re-acquired by a later caller, which the advisory
    /// contract tolerates.
    pub fn force_clear(&self) {
        self.held.clear();
    }
}

/// RAII token for one creation attempt
#[derive(Debug)]
pub struct PendingCreationGuard {
    held: Arc<DashMap<MappingKey, Instant>>,
    key: MappingKey,
}

impl Drop for PendingCreationGuard {
    fn drop(&mut self) {
        self.held.remove(&self.key);
    }
}
