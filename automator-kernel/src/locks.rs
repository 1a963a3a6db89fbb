//! Cross-job locking.
//!
//! Jobs for the same node must not interleave their write/delete + reload
//! sequence; jobs for different nodes run freely. Daemon reloads are
//! serialised process-wide.

use parking_lot::{ArcMutexGuard, Mutex, MutexGuard, RawMutex};
use std::collections::HashMap;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Advisory locks keyed by node name. Entries disappear once nobody holds
/// or waits on them.
#[derive(Debug, Default)]
pub struct NodeLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NodeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the lock for `node_name` is free.
    pub fn lock(&self, node_name: &str) -> NodeGuard<'_> {
        let entry = {
            let mut locks = self.locks.lock();
            locks
                .entry(node_name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = entry.lock_arc();
        NodeGuard {
            owner: self,
            node_name: node_name.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of nodes with a live lock entry.
    pub fn active(&self) -> usize {
        self.locks.lock().len()
    }
}

pub struct NodeGuard<'a> {
    owner: &'a NodeLocks,
    node_name: String,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl NodeGuard<'_> {
    pub fn node_name(&self) -> &str {
        &self.node_name
    }
}

impl Drop for NodeGuard<'_> {
    fn drop(&mut self) {
        // release first so our own Arc clone is gone before the count check
        self.guard.take();
        let mut locks = self.owner.locks.lock();
        if let Some(entry) = locks.get(&self.node_name) {
            if Arc::strong_count(entry) == 1 {
                locks.remove(&self.node_name);
            }
        }
    }
}

/// Only one daemon reload in flight at a time.
#[derive(Debug, Default)]
pub struct ReloadLock {
    inner: Mutex<()>,
}

impl ReloadLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> MutexGuard<'_, ()> {
        self.inner.lock()
    }
}
