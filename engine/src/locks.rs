//! Per-destination serialization of header changes.
//!
//! Two submissions to the same form can both read a header row that lacks a
//! new column and both append it. Header read-reconcile-write sequences are
//! therefore run under a lock keyed by destination id. Row appends do not
//! take the lock.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::DestinationId;

/// Registry of header locks, one per destination.
///
/// Thread-safe and shared by every operation of an orchestrator.
#[derive(Debug, Default)]
pub struct HeaderLocks {
    locks: DashMap<DestinationId, Arc<Mutex<()>>>,
}

impl HeaderLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Wait for exclusive header access to a destination.
    pub async fn acquire(&self, destination_id: &str) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the map shard is not held across the await.
        let lock = self
            .locks
            .entry(destination_id.to_string())
            .or_default()
            .clone();

        tracing::trace!(destination_id, "waiting for header lock");
        lock.lock_owned().await
    }

    /// Drop the lock of a destination that is no longer mapped.
    ///
    /// An entry still held or awaited by another task is kept, so a holder and
    /// a later caller never end up on two different mutexes.
    pub fn forget(&self, destination_id: &str) {
        self.locks
            .remove_if(destination_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of destinations with a lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
