use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tracing::{debug, info};

use crate::error::SyncError;
use crate::item::TrackedItem;

/// Read-only view of the collection after one state transition.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub version: u64,
    pub items: Arc<Vec<T>>,
}

/// The collection owned by a view.
///
/// Dropping the store (or calling [`ItemStore::close`]) detaches every
/// controller created from it: confirmations that arrive afterwards are
/// discarded instead of being applied.
pub struct ItemStore<T: TrackedItem> {
    shared: Arc<Shared<T>>,
}

pub(super) struct Shared<T: TrackedItem> {
    state: Mutex<State<T>>,
    publisher: watch::Sender<Snapshot<T>>,
    pub(super) released: Arc<Notify>,
    open: AtomicBool,
}

pub(super) struct State<T: TrackedItem> {
    items: Vec<T>,
    pending: HashSet<T::Id>,
    version: u64,
}

impl<T: TrackedItem> ItemStore<T> {
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    pub fn with_items(items: Vec<T>) -> Self {
        let (publisher, _) = watch::channel(Snapshot {
            version: 0,
            items: Arc::new(items.clone()),
        });
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    items,
                    pending: HashSet::new(),
                    version: 0,
                }),
                publisher,
                released: Arc::new(Notify::new()),
                open: AtomicBool::new(true),
            }),
        }
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        self.shared.publisher.borrow().clone()
    }

    /// Receives a new snapshot after every apply, rollback, delete and
    /// load.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.shared.publisher.subscribe()
    }

    pub fn get(&self, id: &T::Id) -> Option<T> {
        let state = self.shared.state.lock();
        state.find(id).map(|idx| state.items[idx].clone())
    }

    pub fn version(&self) -> u64 {
        self.shared.state.lock().version
    }

    pub fn is_pending(&self, id: &T::Id) -> bool {
        self.shared.state.lock().pending.contains(id)
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Tears the view down. In-flight operations finish remotely but no
    /// longer write to this store.
    pub fn close(&self) {
        if self.shared.open.swap(false, Ordering::SeqCst) {
            info!("item store closed");
            self.shared.released.notify_waiters();
        }
    }

    pub(super) fn downgrade(&self) -> Weak<Shared<T>> {
        Arc::downgrade(&self.shared)
    }
}

impl<T: TrackedItem> Default for ItemStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TrackedItem> Drop for ItemStore<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: TrackedItem> Shared<T> {
    pub(super) fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub(super) fn lock(&self) -> parking_lot::MutexGuard<'_, State<T>> {
        self.state.lock()
    }

    /// Publishes the current state as a new snapshot. Callers hold the
    /// state lock so versions reach subscribers in order.
    pub(super) fn publish(&self, state: &mut State<T>) {
        state.version += 1;
        let snapshot = Snapshot {
            version: state.version,
            items: Arc::new(state.items.clone()),
        };
        debug!(version = snapshot.version, count = snapshot.items.len(), "published snapshot");
        self.publisher.send_replace(snapshot);
    }
}

impl<T: TrackedItem> State<T> {
    pub(super) fn find(&self, id: &T::Id) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub(super) fn item(&self, idx: usize) -> &T {
        &self.items[idx]
    }

    pub(super) fn item_mut(&mut self, idx: usize) -> &mut T {
        &mut self.items[idx]
    }

    pub(super) fn remove(&mut self, idx: usize) -> T {
        self.items.remove(idx)
    }

    pub(super) fn len(&self) -> usize {
        self.items.len()
    }

    pub(super) fn first_pending(&self) -> Option<&T::Id> {
        self.pending.iter().next()
    }

    /// Marks `id` as having an operation in flight. Returns false when
    /// one already exists.
    pub(super) fn claim(&mut self, id: &T::Id) -> bool {
        self.pending.insert(id.clone())
    }

    pub(super) fn release(&mut self, id: &T::Id) {
        self.pending.remove(id);
    }

    /// Replaces the collection with freshly fetched records.
    pub(super) fn replace(&mut self, items: Vec<T>) -> Result<(), SyncError> {
        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            if !seen.insert(item.id().clone()) {
                return Err(SyncError::MalformedPayload(format!(
                    "duplicate record id {}",
                    item.id()
                )));
            }
        }
        self.items = items;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::CheckIn;

    fn check_in(id: i64) -> CheckIn {
        CheckIn {
            id,
            user_id: "u".to_string(),
            title: format!("check-in {id}"),
            description: String::new(),
            time: "08:00".to_string(),
            completed: false,
            active: true,
        }
    }

    #[test]
    fn new_store_starts_at_version_zero() {
        let store = ItemStore::with_items(vec![check_in(1), check_in(2)]);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.version, 0);
        assert_eq!(snapshot.items.len(), 2);
        assert_eq!(store.get(&2).map(|item| item.id), Some(2));
        assert!(store.get(&3).is_none());
    }

    #[test]
    fn replace_rejects_duplicate_ids() {
        let store = ItemStore::with_items(vec![check_in(1)]);
        let mut state = store.shared.lock();
        let err = state
            .replace(vec![check_in(5), check_in(5)])
            .expect_err("duplicates");
        assert!(matches!(err, SyncError::MalformedPayload(_)));
        assert_eq!(state.items.len(), 1);
    }

    #[test]
    fn close_is_observable_and_idempotent() {
        let store: ItemStore<CheckIn> = ItemStore::new();
        assert!(store.is_open());
        store.close();
        store.close();
        assert!(!store.is_open());
    }
}
