//! Live subscription handles for store snapshots
//!
//! A subscription delivers a full, ordered snapshot on every underlying
//! mutation (full-resnapshot semantics: there is no delta encoding).
//! Dropping the handle disposes the listener; the store prunes the sender
//! side on the next notification attempt.

use tokio::sync::watch;

/// Handle to a live snapshot stream
///
/// Holds the receiving half of a `tokio::sync::watch` channel whose sender
/// is owned by the store. The store replaces the sender when a new
/// subscription is taken out for the same view, which closes older handles
/// (at most one live subscription per view).
#[derive(Debug)]
pub struct Subscription<T> {
    rx: watch::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    pub(crate) fn new(rx: watch::Receiver<T>) -> Self {
        Self { rx }
    }

    /// The most recently delivered snapshot
    pub fn current(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Wait for the next snapshot
    ///
    /// Returns `None` once the store side is gone: the subscription was
    /// replaced by a newer one or the store was dropped.
    pub async fn changed(&mut self) -> Option<T> {
        match self.rx.changed().await {
            Ok(()) => Some(self.rx.borrow_and_update().clone()),
            Err(_) => None,
        }
    }

    /// Explicitly dispose of the subscription
    ///
    /// Equivalent to dropping the handle; provided so call sites can make
    /// the teardown visible.
    pub fn dispose(self) {}
}
