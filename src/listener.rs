//! Copy-on-write listener lists
//!
//! Dispatch iterates over an immutable snapshot; adding or removing a
//! listener swaps in a new list. A listener added or removed during a
//! dispatch therefore never disturbs the dispatch in progress.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Handle returned when a listener is added, used to remove it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A set of listeners of type `L` (usually a trait object)
pub struct ListenerSet<L: ?Sized> {
    listeners: RwLock<Arc<Vec<(ListenerId, Arc<L>)>>>,
    next_id: AtomicU64,
}

impl<L: ?Sized> ListenerSet<L> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn add(&self, listener: Arc<L>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut guard = self.listeners.write();
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push((id, listener));
        *guard = Arc::new(next);
        id
    }

    /// Remove a listener; returns false if it was not registered
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut guard = self.listeners.write();
        if !guard.iter().any(|(lid, _)| *lid == id) {
            return false;
        }
        let next: Vec<_> = guard.iter().filter(|(lid, _)| *lid != id).cloned().collect();
        *guard = Arc::new(next);
        true
    }

    /// Snapshot of the current listeners
    pub fn snapshot(&self) -> Arc<Vec<(ListenerId, Arc<L>)>> {
        Arc::clone(&self.listeners.read())
    }

    /// Call `f` for every listener of the current snapshot
    pub fn for_each(&self, mut f: impl FnMut(&L)) {
        let snapshot = self.snapshot();
        for (_, listener) in snapshot.iter() {
            f(listener);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self::new()
    }
}
