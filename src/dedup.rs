//! Deduplication registry for admitted message identifiers.
//!
//! Replaying a persisted capture feeds the same identifiers through the
//! pipeline a second time; [`KnownMessageIdRegistry`] is what makes that
//! idempotent. Identifiers move `unknown -> admitted -> converted`, blank
//! identifiers opt out entirely, and removals notify a single registered
//! eviction callback so dependent indexes stay consistent.

use std::{collections::HashMap, sync::Mutex};

use crate::element::ElementId;

type EvictionCallback = Box<dyn Fn(&ElementId) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IdState {
    Admitted,
    Converted,
}

#[derive(Default)]
struct RegistryInner {
    states: HashMap<ElementId, IdState>,
    on_evict: Option<EvictionCallback>,
}

/// Tracks which message identifiers have been admitted or converted.
///
/// All operations serialise on one internal lock; the registry is shared by
/// every thread feeding the same [`MessageHistory`](crate::history::MessageHistory).
#[derive(Default)]
pub struct KnownMessageIdRegistry {
    inner: Mutex<RegistryInner>,
}

impl KnownMessageIdRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register the callback invoked once per identifier evicted via
    /// [`remove`](Self::remove) or [`clear`](Self::clear). Replaces any
    /// previously registered callback.
    pub fn set_eviction_callback(&self, callback: impl Fn(&ElementId) + Send + Sync + 'static) {
        let mut inner = self.inner.lock().expect("dedup registry lock poisoned");
        inner.on_evict = Some(Box::new(callback));
    }

    /// Reserve an identifier for conversion.
    ///
    /// Returns `false` when the identifier was already admitted or
    /// converted; the caller must then skip re-processing. Blank
    /// identifiers always succeed without being recorded.
    pub fn try_admit(&self, id: &ElementId) -> bool {
        if id.is_blank() {
            return true;
        }
        let mut inner = self.inner.lock().expect("dedup registry lock poisoned");
        if inner.states.contains_key(id) {
            tracing::debug!(%id, "duplicate identifier rejected");
            return false;
        }
        inner.states.insert(id.clone(), IdState::Admitted);
        true
    }

    /// Mark an admitted identifier as fully converted.
    pub fn mark_converted(&self, id: &ElementId) {
        if id.is_blank() {
            return;
        }
        let mut inner = self.inner.lock().expect("dedup registry lock poisoned");
        inner.states.insert(id.clone(), IdState::Converted);
    }

    /// Whether the identifier has completed conversion.
    #[must_use]
    pub fn is_converted(&self, id: &ElementId) -> bool {
        let inner = self.inner.lock().expect("dedup registry lock poisoned");
        inner.states.get(id) == Some(&IdState::Converted)
    }

    /// Forget an identifier, notifying the eviction callback.
    pub fn remove(&self, id: &ElementId) {
        let mut inner = self.inner.lock().expect("dedup registry lock poisoned");
        if inner.states.remove(id).is_some()
            && let Some(callback) = inner.on_evict.as_ref()
        {
            callback(id);
        }
    }

    /// Forget every identifier, notifying the eviction callback once per
    /// identifier.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("dedup registry lock poisoned");
        let ids: Vec<ElementId> = inner.states.keys().cloned().collect();
        inner.states.clear();
        if let Some(callback) = inner.on_evict.as_ref() {
            for id in &ids {
                callback(id);
            }
        }
    }

    /// Number of identifiers currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("dedup registry lock poisoned")
            .states
            .len()
    }

    /// Whether no identifiers are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    fn id(value: &str) -> ElementId { ElementId::from(value) }

    #[test]
    fn second_admission_is_rejected() {
        let registry = KnownMessageIdRegistry::new();
        assert!(registry.try_admit(&id("m1")));
        assert!(!registry.try_admit(&id("m1")));
        registry.mark_converted(&id("m1"));
        assert!(!registry.try_admit(&id("m1")));
        assert!(registry.is_converted(&id("m1")));
    }

    #[test]
    fn blank_identifiers_opt_out() {
        let registry = KnownMessageIdRegistry::new();
        assert!(registry.try_admit(&id("")));
        assert!(registry.try_admit(&id("   ")));
        assert!(registry.is_empty());
    }

    #[test]
    fn removal_notifies_callback_once_per_id() {
        let registry = KnownMessageIdRegistry::new();
        let evicted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&evicted);
        registry.set_eviction_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(registry.try_admit(&id("a")));
        assert!(registry.try_admit(&id("b")));
        registry.remove(&id("a"));
        registry.remove(&id("a"));
        registry.clear();
        assert_eq!(evicted.load(Ordering::SeqCst), 2);
        assert!(registry.try_admit(&id("a")), "removed ids may be re-admitted");
    }
}
