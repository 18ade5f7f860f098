//! Disposable subscription handles.

use std::fmt;

use parking_lot::Mutex;

type Teardown = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a live producer/consumer relationship.
///
/// Disposing the handle runs its teardown exactly once, no matter how many
/// times [`dispose`](Self::dispose) is called or from which thread. Dropping
/// the handle disposes it.
#[must_use = "dropping a Subscription detaches it immediately"]
pub struct Subscription {
    teardown: Mutex<Option<Teardown>>,
}

impl Subscription {
    /// Create a subscription that runs `teardown` when disposed.
    pub fn new<F>(teardown: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            teardown: Mutex::new(Some(Box::new(teardown))),
        }
    }

    /// A subscription that is already disposed.
    pub fn empty() -> Self {
        Self {
            teardown: Mutex::new(None),
        }
    }

    /// Run the teardown if it has not run yet.
    pub fn dispose(&self) {
        // Take under the lock, run outside it: teardown may re-enter.
        let teardown = self.teardown.lock().take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    /// Whether the teardown has already run (or was given up by `detach`).
    pub fn is_disposed(&self) -> bool {
        self.teardown.lock().is_none()
    }

    /// Give up the handle without disposing.
    ///
    /// The relationship then lives until the producer terminates or, for
    /// weak subscriptions, until the consumer is found dead on delivery.
    pub fn detach(self) {
        drop(self.teardown.lock().take());
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn counting() -> (Arc<AtomicI32>, Subscription) {
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let sub = Subscription::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        (count, sub)
    }

    #[test]
    fn dispose_runs_teardown_once() {
        let (count, sub) = counting();

        assert!(!sub.is_disposed());
        sub.dispose();
        sub.dispose();
        sub.dispose();

        assert!(sub.is_disposed());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_disposes() {
        let (count, sub) = counting();
        drop(sub);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispose_then_drop_does_not_run_twice() {
        let (count, sub) = counting();
        sub.dispose();
        drop(sub);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detach_skips_teardown() {
        let (count, sub) = counting();
        sub.detach();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_is_already_disposed() {
        assert!(Subscription::empty().is_disposed());
    }
}
