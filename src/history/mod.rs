//! Bounded, ordered store of every admitted message element.
//!
//! Elements are provisionally admitted when conversion begins so byte
//! accounting stays accurate while parsing is in flight. A single cheap
//! lock protects sequence assignment and size bookkeeping; plugin
//! execution never runs under it. Readers choose between the snapshot view
//! (unfinished elements exposed as-is) and the complete view, whose
//! accessors wait, bounded by a timeout, for elements to reach a terminal
//! conversion phase.

mod board;
#[cfg(test)]
mod tests;
mod view;

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
    time::Duration,
};

use thiserror::Error;
use tokio::sync::RwLock;

pub use board::CompletionBoard;
pub use view::CompleteView;

use crate::{
    config::{CapacityPolicy, CoreConfig},
    element::{ElementId, MessageElement, SequenceNumber},
    metrics,
};

/// Shared handle to an element owned by the history.
///
/// Conversion holds the write half for the duration of the pipeline;
/// readers take the read half and see a consistent element.
pub type SharedElement = Arc<RwLock<MessageElement>>;

type RemovalCallback = Box<dyn Fn(&ElementId) + Send + Sync>;

/// Error returned when a complete-view wait does not finish in time.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WaitError {
    /// The element named did not reach a terminal phase within the bound.
    /// This indicates a stuck pipeline and should fail the calling
    /// operation loudly.
    #[error("timed out after {timeout:?} waiting for element {id} to finish conversion")]
    Timeout {
        /// Identifier of the stalled element.
        id: ElementId,
        /// The configured wait bound.
        timeout: Duration,
    },
    /// The completion signal was dropped before the element turned
    /// terminal.
    #[error("completion signal for element {id} was lost before conversion finished")]
    SignalLost {
        /// Identifier of the affected element.
        id: ElementId,
    },
}

struct HistoryEntry {
    id: ElementId,
    bytes: u64,
    element: SharedElement,
}

#[derive(Default)]
struct HistoryInner {
    by_seq: BTreeMap<u64, HistoryEntry>,
    by_id: HashMap<ElementId, u64>,
    next_seq: u64,
    total_bytes: u64,
}

impl HistoryInner {
    /// Detach one entry, fixing both indexes and the byte total. The caller
    /// notifies removal callbacks after releasing the lock.
    fn detach(&mut self, seq: u64) -> Option<ElementId> {
        let entry = self.by_seq.remove(&seq)?;
        self.by_id.remove(&entry.id);
        self.total_bytes -= entry.bytes;
        Some(entry.id)
    }
}

/// Bounded message history with monotonic sequence numbering.
pub struct MessageHistory {
    inner: Mutex<HistoryInner>,
    removal_callbacks: Mutex<Vec<RemovalCallback>>,
    board: Arc<CompletionBoard>,
    capacity: CapacityPolicy,
    wait_timeout: Duration,
}

impl MessageHistory {
    /// Create a history with the given retention policy and wait bound.
    #[must_use]
    pub fn new(capacity: CapacityPolicy, wait_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(HistoryInner::default()),
            removal_callbacks: Mutex::new(Vec::new()),
            board: Arc::new(CompletionBoard::new()),
            capacity,
            wait_timeout,
        }
    }

    /// Create a history from the core configuration.
    #[must_use]
    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(config.capacity, config.history_wait_timeout)
    }

    /// The completion board executors signal terminal phases on.
    #[must_use]
    pub fn completion_board(&self) -> Arc<CompletionBoard> { Arc::clone(&self.board) }

    /// Register a callback invoked exactly once per removed entry, whether
    /// removal came from eviction, explicit removal, or a full clear.
    ///
    /// Callbacks run outside the bookkeeping lock but must not call back
    /// into the history's removal paths.
    pub fn add_removal_callback(&self, callback: impl Fn(&ElementId) + Send + Sync + 'static) {
        self.removal_callbacks
            .lock()
            .expect("callback lock poisoned")
            .push(Box::new(callback));
    }

    /// Admit an element, assigning the next sequence number and triggering
    /// eviction per the retention policy.
    pub fn admit(&self, mut element: MessageElement) -> SharedElement {
        let removed;
        let shared;
        {
            let mut inner = self.inner.lock().expect("history lock poisoned");
            let seq = inner.next_seq;
            inner.next_seq += 1;
            element.assign_sequence(SequenceNumber::new(seq));
            let id = element.id().clone();
            let bytes = element.byte_len() as u64;
            shared = Arc::new(RwLock::new(element));
            if !id.is_blank() {
                inner.by_id.insert(id.clone(), seq);
            }
            inner.by_seq.insert(
                seq,
                HistoryEntry {
                    id,
                    bytes,
                    element: Arc::clone(&shared),
                },
            );
            inner.total_bytes += bytes;
            removed = Self::evict_locked(&mut inner, self.capacity);
        }
        metrics::inc_admitted();
        self.notify_removed(&removed);
        shared
    }

    /// Apply the retention policy, returning the identifiers of evicted
    /// entries (oldest first).
    fn evict_locked(inner: &mut HistoryInner, capacity: CapacityPolicy) -> Vec<ElementId> {
        let mut removed = Vec::new();
        match capacity {
            CapacityPolicy::Unbounded => {}
            CapacityPolicy::Zero => {
                let seqs: Vec<u64> = inner.by_seq.keys().copied().collect();
                for seq in seqs {
                    removed.extend(inner.detach(seq));
                }
            }
            CapacityPolicy::Bytes(limit) => {
                while inner.total_bytes > limit.get() {
                    let Some(oldest) = inner.by_seq.keys().next().copied() else {
                        break;
                    };
                    removed.extend(inner.detach(oldest));
                }
            }
        }
        removed
    }

    fn notify_removed(&self, removed: &[ElementId]) {
        if removed.is_empty() {
            return;
        }
        metrics::inc_evicted(removed.len() as u64);
        let callbacks = self.removal_callbacks.lock().expect("callback lock poisoned");
        for id in removed {
            tracing::trace!(%id, "history entry removed");
            for callback in callbacks.iter() {
                callback(id);
            }
        }
    }

    /// Shrink the recorded byte size of `id` to `bytes`, keeping the running
    /// total consistent. Used when a carve narrows a provisionally admitted
    /// element's raw range to the consumed prefix.
    pub(crate) fn shrink_entry(&self, id: &ElementId, bytes: u64) {
        let mut inner = self.inner.lock().expect("history lock poisoned");
        let Some(seq) = inner.by_id.get(id).copied() else {
            return;
        };
        let Some(entry) = inner.by_seq.get_mut(&seq) else {
            return;
        };
        if entry.bytes > bytes {
            let delta = entry.bytes - bytes;
            entry.bytes = bytes;
            inner.total_bytes -= delta;
        }
    }

    /// Remove one entry by identifier. Returns whether it existed.
    pub fn remove(&self, id: &ElementId) -> bool {
        let removed;
        {
            let mut inner = self.inner.lock().expect("history lock poisoned");
            let Some(seq) = inner.by_id.get(id).copied() else {
                return false;
            };
            removed = inner.detach(seq).into_iter().collect::<Vec<_>>();
        }
        self.notify_removed(&removed);
        true
    }

    /// Remove every entry, notifying removal callbacks for each.
    pub fn clear_all(&self) {
        let removed;
        {
            let mut inner = self.inner.lock().expect("history lock poisoned");
            let seqs: Vec<u64> = inner.by_seq.keys().copied().collect();
            let mut ids = Vec::with_capacity(seqs.len());
            for seq in seqs {
                ids.extend(inner.detach(seq));
            }
            removed = ids;
        }
        self.notify_removed(&removed);
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("history lock poisoned").by_seq.len()
    }

    /// Whether the history holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Total raw bytes currently retained (including in-flight elements).
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.inner.lock().expect("history lock poisoned").total_bytes
    }

    /// Look up an element by identifier without waiting for conversion.
    #[must_use]
    pub fn get(&self, id: &ElementId) -> Option<SharedElement> {
        let inner = self.inner.lock().expect("history lock poisoned");
        let seq = inner.by_id.get(id)?;
        inner.by_seq.get(seq).map(|entry| Arc::clone(&entry.element))
    }

    /// Look up an element by sequence number without waiting.
    #[must_use]
    pub fn get_by_sequence(&self, sequence: SequenceNumber) -> Option<SharedElement> {
        let inner = self.inner.lock().expect("history lock poisoned");
        inner
            .by_seq
            .get(&sequence.get())
            .map(|entry| Arc::clone(&entry.element))
    }

    /// Sequence-ordered snapshot of all entries, unfinished elements
    /// exposed as-is (the asynchronous view).
    #[must_use]
    pub fn snapshot(&self) -> Vec<SharedElement> {
        let inner = self.inner.lock().expect("history lock poisoned");
        inner
            .by_seq
            .values()
            .map(|entry| Arc::clone(&entry.element))
            .collect()
    }

    /// Read-only view whose accessors wait for elements to reach a
    /// terminal conversion phase before exposing them.
    #[must_use]
    pub fn complete(&self) -> CompleteView<'_> { CompleteView::new(self) }

    /// Wait until `element` reaches a terminal phase, bounded by the
    /// configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Timeout`] naming the stalled identifier when
    /// the bound elapses, or [`WaitError::SignalLost`] if the completion
    /// channel closed early.
    pub async fn wait_terminal(&self, element: &SharedElement) -> Result<(), WaitError> {
        let id = {
            let guard = element.read().await;
            if guard.phase().is_terminal() {
                return Ok(());
            }
            guard.id().clone()
        };
        let receiver = self.board.subscribe(&id);
        // the element may have turned terminal between the check and the
        // subscription
        if element.read().await.phase().is_terminal() {
            drop(receiver);
            self.board.prune(&id);
            return Ok(());
        }
        match tokio::time::timeout(self.wait_timeout, receiver).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => {
                if element.read().await.phase().is_terminal() {
                    Ok(())
                } else {
                    self.board.prune(&id);
                    Err(WaitError::SignalLost { id })
                }
            }
            Err(_) => {
                // the timed-out receiver was dropped by the timeout future
                self.board.prune(&id);
                Err(WaitError::Timeout {
                    id,
                    timeout: self.wait_timeout,
                })
            }
        }
    }
}
