use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use fieldpulse_domain::Collection;

use crate::Document;

/// Receives the full ordered collection snapshot.
pub type SnapshotCallback = Arc<dyn Fn(Vec<Document>) + Send + Sync>;

/// Receives the current document, or `None` once it no longer exists.
pub type DocumentCallback = Arc<dyn Fn(Option<Document>) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionTarget {
    Collection {
        collection: Collection,
        limit: Option<usize>,
    },
    Document {
        collection: Collection,
        id: String,
    },
}

impl SubscriptionTarget {
    pub fn collection(&self) -> Collection {
        match self {
            Self::Collection { collection, .. } | Self::Document { collection, .. } => *collection,
        }
    }
}

#[derive(Clone)]
pub(crate) enum ListenerCallback {
    Snapshot(SnapshotCallback),
    Document(DocumentCallback),
}

/// A registered listener as seen by the notifier.
#[derive(Clone)]
pub(crate) struct ListenerHandle {
    pub(crate) target: SubscriptionTarget,
    callback: ListenerCallback,
    active: Arc<AtomicBool>,
}

impl ListenerHandle {
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn deliver_snapshot(&self, documents: Vec<Document>) {
        if let ListenerCallback::Snapshot(callback) = &self.callback
            && self.is_active()
        {
            callback(documents);
        }
    }

    pub(crate) fn deliver_document(&self, document: Option<Document>) {
        if let ListenerCallback::Document(callback) = &self.callback
            && self.is_active()
        {
            callback(document);
        }
    }
}

/// Live listeners keyed by registration id.
///
/// The registry never invokes callbacks while its own lock is held; the store
/// takes a copy of the relevant handles and delivers outside the lock.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<u64, ListenerHandle>>,
}

impl ListenerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, ListenerHandle>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn register(
        self: &Arc<Self>,
        target: SubscriptionTarget,
        callback: ListenerCallback,
    ) -> (Subscription, ListenerHandle) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        let handle = ListenerHandle {
            target,
            callback,
            active: Arc::clone(&active),
        };
        self.lock().insert(id, handle.clone());

        let subscription = Subscription {
            id,
            active,
            registry: Arc::downgrade(self),
        };
        (subscription, handle)
    }

    pub(crate) fn register_collection(
        self: &Arc<Self>,
        collection: Collection,
        limit: Option<usize>,
        callback: SnapshotCallback,
    ) -> (Subscription, ListenerHandle) {
        self.register(
            SubscriptionTarget::Collection { collection, limit },
            ListenerCallback::Snapshot(callback),
        )
    }

    pub(crate) fn register_document(
        self: &Arc<Self>,
        collection: Collection,
        id: &str,
        callback: DocumentCallback,
    ) -> (Subscription, ListenerHandle) {
        self.register(
            SubscriptionTarget::Document {
                collection,
                id: id.to_string(),
            },
            ListenerCallback::Document(callback),
        )
    }

    pub(crate) fn listeners_for(&self, collection: Collection) -> Vec<ListenerHandle> {
        self.lock()
            .values()
            .filter(|handle| handle.target.collection() == collection && handle.is_active())
            .cloned()
            .collect()
    }

    /// Number of live listeners attached to `collection`.
    pub fn active_count(&self, collection: Collection) -> usize {
        self.lock()
            .values()
            .filter(|handle| handle.target.collection() == collection && handle.is_active())
            .count()
    }

    fn remove(&self, id: u64) {
        self.lock().remove(&id);
    }
}

/// Cancellation handle for a live subscription. Dropping it also cancels.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stops delivery. No callback runs after this returns.
    pub fn cancel(self) {
        drop(self);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn dropping_subscription_unregisters_listener() {
        let registry = ListenerRegistry::new();
        let (first, _) =
            registry.register_collection(Collection::Jobs, None, Arc::new(|_documents| {}));
        let (second, _) = registry.register_document(
            Collection::Jobs,
            "doc_1",
            Arc::new(|_document| {}),
        );
        assert_eq!(registry.active_count(Collection::Jobs), 2);
        assert_eq!(registry.active_count(Collection::Customers), 0);

        first.cancel();
        assert_eq!(registry.active_count(Collection::Jobs), 1);
        drop(second);
        assert_eq!(registry.active_count(Collection::Jobs), 0);
    }

    #[test]
    fn cancelled_handle_stops_delivery() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let (subscription, handle) = registry.register_collection(
            Collection::Invoices,
            None,
            Arc::new(move |_documents| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        handle.deliver_snapshot(Vec::new());
        subscription.cancel();
        handle.deliver_snapshot(Vec::new());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!handle.is_active());
    }
}
