//! Bounded, append-only history of ingested records.
//!
//! Every stream of data the session ingests (command responses, telemetry
//! packets, video frames) lands in a [`History`]: a fixed-capacity ring buffer
//! ordered by arrival. Appending past capacity evicts the oldest entry.
//!
//! Items are stored behind [`Arc`] so readers get a cheap snapshot of the
//! newest entry without holding the lock. The sequence itself is guarded by a
//! single mutex per history, which makes `append` and `latest` linearizable
//! across the receive loop, the dispatcher and facade readers.
//!
//! Each history also publishes its newest item on a `tokio::sync::watch`
//! channel so async consumers can follow updates instead of polling.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::trace;

/// Default capacity for command response and telemetry histories.
pub const DEFAULT_CAPACITY: usize = 100;

/// Default capacity for the video frame history.
pub const DEFAULT_VIDEO_CAPACITY: usize = 10;

/// Fixed-capacity FIFO history with O(1) access to the newest item.
#[derive(Debug)]
pub struct History<T> {
    items: Mutex<VecDeque<Arc<T>>>,
    capacity: usize,
    updates: watch::Sender<Option<Arc<T>>>,
}

impl<T> History<T> {
    /// Create an empty history holding at most `capacity` items.
    ///
    /// A capacity of zero is raised to one so `latest()` stays meaningful.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (updates, _) = watch::channel(None);
        Self { items: Mutex::new(VecDeque::with_capacity(capacity)), capacity, updates }
    }

    /// Build an item with `make` and append it.
    ///
    /// The constructor runs before the lock is taken.
    pub fn create<F>(&self, make: F) -> Arc<T>
    where
        F: FnOnce() -> T,
    {
        self.append(make())
    }

    /// Append an item, evicting from the head while over capacity.
    pub fn append(&self, item: T) -> Arc<T> {
        let item = Arc::new(item);
        self.push(Arc::clone(&item));
        item
    }

    /// Append an already shared item.
    pub fn push(&self, item: Arc<T>) {
        let mut items = self.lock();
        items.push_back(Arc::clone(&item));
        while items.len() > self.capacity {
            items.pop_front();
        }
        trace!(len = items.len(), capacity = self.capacity, "history append");
        // Published under the lock so subscribers observe append order.
        self.updates.send_replace(Some(item));
    }

    /// The most recently appended item, if any.
    pub fn latest(&self) -> Option<Arc<T>> {
        self.lock().back().cloned()
    }

    /// Number of retained items.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy of the retained items, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.lock().iter().cloned().collect()
    }

    /// Watch the newest item. The receiver starts at the current latest value.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<T>>> {
        self.updates.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<T>>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
