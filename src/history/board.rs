//! One-shot completion signalling between the executor and history readers.
//!
//! A reader that finds an element still mid-conversion subscribes here and
//! receives exactly one signal when the executor marks the element terminal
//! (completed or deleted). Waiters for identifiers that never complete are
//! bounded by the reader-side timeout, not by the board.

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::element::ElementId;

/// Registry of pending completion waiters keyed by element identifier.
#[derive(Default)]
pub struct CompletionBoard {
    waiters: DashMap<ElementId, Vec<oneshot::Sender<()>>>,
}

impl CompletionBoard {
    /// Create an empty board.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register a one-shot waiter for `id`.
    ///
    /// Callers must re-check the element's phase after subscribing: the
    /// element may have reached a terminal phase between the check that
    /// motivated the subscription and the subscription itself.
    #[must_use]
    pub fn subscribe(&self, id: &ElementId) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.waiters.entry(id.clone()).or_default().push(tx);
        rx
    }

    /// Signal every waiter registered for `id` and forget them.
    pub fn complete(&self, id: &ElementId) {
        if let Some((_, senders)) = self.waiters.remove(id) {
            for sender in senders {
                // a dropped receiver stopped waiting; nothing to do
                let _ = sender.send(());
            }
        }
    }

    /// Drop abandoned waiters for `id`, removing the slot once none remain.
    ///
    /// Readers call this after giving up on a wait so identifiers that
    /// never complete do not accumulate dead senders.
    pub fn prune(&self, id: &ElementId) {
        let emptied = self.waiters.get_mut(id).map(|mut senders| {
            senders.retain(|sender| !sender.is_closed());
            senders.is_empty()
        });
        if emptied == Some(true) {
            self.waiters.remove_if(id, |_, senders| senders.is_empty());
        }
    }

    /// Number of identifiers with at least one pending waiter.
    #[must_use]
    pub fn pending(&self) -> usize { self.waiters.len() }
}
