//! Shared order book handle
//!
//! One writer (the feed session) and one reader (the depth poller) share a
//! book through a single `parking_lot::Mutex`. Each call holds the lock for
//! exactly one fold, one resync or one bounded copy, and never across I/O.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{fold, DepthBuffer, OrderBook};
use crate::codec::{SnapshotMessage, UpdateEvent};
use crate::error::FoldError;

/// Cheaply cloneable handle to a lock-protected [`OrderBook`]
#[derive(Debug, Clone, Default)]
pub struct SharedOrderBook {
    inner: Arc<Mutex<OrderBook>>,
}

impl SharedOrderBook {
    /// Create a handle around a fresh, empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one update event under the lock
    pub fn fold(&self, event: &UpdateEvent) -> Result<(), FoldError> {
        let mut book = self.inner.lock();
        fold(&mut book, event)
    }

    /// Replace the book from a snapshot under the lock.
    ///
    /// Readers see either the previous book or the new one, never a
    /// partially cleared book.
    pub fn resync(&self, snapshot: &SnapshotMessage) {
        self.inner.lock().resync(snapshot);
    }

    /// Copy the best levels of both sides into `buffer`
    pub fn read_depth(&self, buffer: &mut DepthBuffer) -> (usize, usize) {
        self.inner.lock().read_depth(buffer)
    }

    pub fn is_synchronized(&self) -> bool {
        self.inner.lock().is_synchronized()
    }

    /// Run `f` against the book under the lock
    pub fn with_book<R>(&self, f: impl FnOnce(&OrderBook) -> R) -> R {
        f(&self.inner.lock())
    }
}
