//! Weak Observer Adapter
//!
//! [`weak_subscribe`] attaches a consumer to a producer without keeping the
//! consumer alive. The producer holds a [`WeakObserver`], which holds only a
//! `Weak` to the consumer and owns the upstream [`Subscription`].
//!
//! # Liveness
//!
//! Liveness is checked lazily, on delivery. The first event that arrives
//! after the consumer has been dropped tears the adapter down (detaching it
//! from the producer) instead of being forwarded. Nothing happens before that
//! event arrives. Dropping the returned handle tears the adapter down
//! immediately; both paths may run, and the upstream subscription is released
//! exactly once.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::{Observable, Observer, StreamError, Subscription};

/// Forwards events to a consumer it does not own.
pub struct WeakObserver<T> {
    target: Weak<dyn Observer<T>>,
    upstream: Mutex<Option<Subscription>>,
    disposed: AtomicBool,
}

impl<T> WeakObserver<T>
where
    T: Send + Sync + 'static,
{
    /// Whether the adapter has been torn down.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Tear down the adapter, releasing the upstream subscription once.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let upstream = self.upstream.lock().take();
        if let Some(upstream) = upstream {
            upstream.dispose();
        }
    }

    fn set_upstream(&self, upstream: Subscription) {
        let mut slot = self.upstream.lock();
        if self.is_disposed() {
            // Torn down while subscribing, e.g. the producer completed
            // synchronously after the consumer had already gone.
            drop(slot);
            upstream.dispose();
            return;
        }
        *slot = Some(upstream);
    }

    /// Resolve the consumer, tearing the adapter down if it is gone.
    fn resolve(&self) -> Option<Arc<dyn Observer<T>>> {
        if self.is_disposed() {
            return None;
        }
        match self.target.upgrade() {
            Some(observer) => Some(observer),
            None => {
                tracing::debug!("weak observer target dropped, detaching from producer");
                self.dispose();
                None
            }
        }
    }
}

impl<T> Observer<T> for WeakObserver<T>
where
    T: Send + Sync + 'static,
{
    fn on_next(&self, value: T) {
        if let Some(observer) = self.resolve() {
            observer.on_next(value);
        }
    }

    fn on_error(&self, error: StreamError) {
        if let Some(observer) = self.resolve() {
            observer.on_error(error);
        }
    }

    fn on_completed(&self) {
        if let Some(observer) = self.resolve() {
            observer.on_completed();
        }
    }
}

impl<T> fmt::Debug for WeakObserver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObserver")
            .field("target_alive", &(self.target.strong_count() > 0))
            .field("disposed", &self.disposed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Attach `consumer` to `source` without keeping `consumer` alive.
///
/// The returned handle disposes the relationship when disposed or dropped.
/// If the handle is [detached](Subscription::detach) instead, the
/// relationship ends the first time `source` delivers an event after
/// `consumer` has been dropped.
pub fn weak_subscribe<T, O>(source: &O, consumer: &Arc<dyn Observer<T>>) -> Subscription
where
    T: Send + Sync + 'static,
    O: Observable<T> + ?Sized,
{
    let adapter = Arc::new(WeakObserver {
        target: Arc::downgrade(consumer),
        upstream: Mutex::new(None),
        disposed: AtomicBool::new(false),
    });

    let as_observer: Arc<dyn Observer<T>> = adapter.clone();
    let upstream = source.subscribe(&as_observer);
    adapter.set_upstream(upstream);

    Subscription::new(move || adapter.dispose())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{CallbackObserver, Subject};
    use std::sync::atomic::AtomicI32;

    /// A producer that counts how often its subscriptions are released.
    struct CountingSource {
        subject: Subject<i32>,
        released: Arc<AtomicI32>,
    }

    impl Observable<i32> for CountingSource {
        fn subscribe(&self, observer: &Arc<dyn Observer<i32>>) -> Subscription {
            let inner = self.subject.subscribe(observer);
            let released = self.released.clone();
            Subscription::new(move || {
                inner.dispose();
                released.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    fn counting_source() -> CountingSource {
        CountingSource {
            subject: Subject::new(),
            released: Arc::new(AtomicI32::new(0)),
        }
    }

    fn counter() -> (Arc<AtomicI32>, Arc<dyn Observer<i32>>) {
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let observer: Arc<dyn Observer<i32>> = Arc::new(CallbackObserver::new(move |_: i32| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));
        (count, observer)
    }

    #[test]
    fn forwards_while_consumer_is_alive() {
        let source = counting_source();
        let (count, observer) = counter();

        let _sub = weak_subscribe(&source, &observer);
        source.subject.on_next(1);
        source.subject.on_next(2);

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn does_not_keep_consumer_alive() {
        let source = counting_source();
        let (_, observer) = counter();
        let weak = Arc::downgrade(&observer);

        let _sub = weak_subscribe(&source, &observer);
        drop(observer);

        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn tears_down_lazily_on_next_event() {
        let source = counting_source();
        let (count, observer) = counter();

        weak_subscribe(&source, &observer).detach();
        drop(observer);

        // Nothing happens until the producer delivers again.
        assert_eq!(source.subject.observer_count(), 1);
        assert_eq!(source.released.load(Ordering::SeqCst), 0);

        source.subject.on_next(1);
        assert_eq!(source.subject.observer_count(), 0);
        assert_eq!(source.released.load(Ordering::SeqCst), 1);

        source.subject.on_next(2);
        assert_eq!(source.released.load(Ordering::SeqCst), 1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn completion_with_dead_consumer_is_silent() {
        let source = counting_source();
        let (_, observer) = counter();

        weak_subscribe(&source, &observer).detach();
        drop(observer);
        source.subject.on_completed();

        assert_eq!(source.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn explicit_and_lazy_teardown_release_once() {
        let source = counting_source();
        let (_, observer) = counter();

        let sub = weak_subscribe(&source, &observer);
        drop(observer);
        source.subject.on_next(1);
        sub.dispose();
        drop(sub);

        assert_eq!(source.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_handle_detaches_immediately() {
        let source = counting_source();
        let (count, observer) = counter();

        let sub = weak_subscribe(&source, &observer);
        drop(sub);
        source.subject.on_next(1);

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(source.subject.observer_count(), 0);
        assert_eq!(source.released.load(Ordering::SeqCst), 1);
    }
}
