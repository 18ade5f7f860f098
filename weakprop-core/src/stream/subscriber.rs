//! Subscriber identity and event handler registries.
//!
//! Every registration (a stream observer or an event handler) gets a unique
//! [`SubscriberId`] so it can be removed again in O(1) while the remaining
//! entries keep their registration order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::Subscription;

/// Unique identifier for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

type Handler<A> = Arc<dyn Fn(&A) + Send + Sync>;
type HandlerMap<A> = Mutex<IndexMap<SubscriberId, Handler<A>>>;

/// A list of event handlers, invoked in registration order.
///
/// Clones share the same handler list.
pub(crate) struct HandlerRegistry<A> {
    handlers: Arc<HandlerMap<A>>,
}

impl<A: 'static> HandlerRegistry<A> {
    pub(crate) fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(IndexMap::new())),
        }
    }

    /// Register a handler. Disposing the returned handle removes it.
    pub(crate) fn add<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        self.handlers.lock().insert(id, Arc::new(handler));

        let handlers: Weak<HandlerMap<A>> = Arc::downgrade(&self.handlers);
        Subscription::new(move || {
            if let Some(handlers) = handlers.upgrade() {
                // The handler may own sibling registrations; drop it unlocked.
                let removed = handlers.lock().shift_remove(&id);
                drop(removed);
            }
        })
    }

    /// Invoke every handler with `args`.
    ///
    /// The list is snapshotted first so handlers may add or remove
    /// registrations while being called.
    pub(crate) fn emit(&self, args: &A) {
        let snapshot: SmallVec<[Handler<A>; 4]> =
            self.handlers.lock().values().cloned().collect();
        for handler in snapshot {
            handler(args);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.handlers.lock().is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.lock().len()
    }
}

impl<A> Clone for HandlerRegistry<A> {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn registry_emits_in_registration_order() {
        let registry = HandlerRegistry::<i32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = seen.clone();
        let _a = registry.add(move |v| first.lock().push(("a", *v)));
        let second = seen.clone();
        let _b = registry.add(move |v| second.lock().push(("b", *v)));

        registry.emit(&7);
        assert_eq!(*seen.lock(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn disposed_handler_is_not_called() {
        let registry = HandlerRegistry::<()>::new();
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let sub = registry.add(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        registry.emit(&());
        sub.dispose();
        registry.emit(&());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn removing_handler_that_owns_sibling_registration() {
        let registry = HandlerRegistry::<()>::new();
        let sibling = registry.add(|_| {});
        let owner = registry.add(move |_| {
            let _owned = &sibling;
        });
        assert_eq!(registry.len(), 2);

        drop(owner);
        assert!(registry.is_empty());
    }
}
