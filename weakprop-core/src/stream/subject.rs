//! Subjects: multicast push channels.
//!
//! A [`Subject`] is both an observer and an observable. Every value pushed
//! into it is forwarded to all attached observers in registration order.
//! Once it completes, fails or is disposed it is stopped for good.
//!
//! Observers are called outside the subject's lock, on a snapshot of the
//! registry, so an observer may subscribe, unsubscribe or push re-entrantly.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::{Observable, Observer, StreamError, SubscriberId, Subscription};

type Slot<T> = Arc<dyn Observer<T>>;
type Snapshot<T> = SmallVec<[Slot<T>; 4]>;

#[derive(Clone)]
enum Terminal {
    Completed,
    Failed(StreamError),
    Disposed,
}

struct SubjectState<T> {
    observers: IndexMap<SubscriberId, Slot<T>>,
    terminal: Option<Terminal>,
}

/// A multicast channel.
///
/// Cloning a `Subject` creates a new handle to the same channel.
pub struct Subject<T> {
    state: Arc<Mutex<SubjectState<T>>>,
}

impl<T> Subject<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an open subject with no observers.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SubjectState {
                observers: IndexMap::new(),
                terminal: None,
            })),
        }
    }

    /// Number of attached observers.
    pub fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }

    /// Whether the subject has completed, failed or been disposed.
    pub fn is_stopped(&self) -> bool {
        self.state.lock().terminal.is_some()
    }

    /// Drop every observer without notifying it and stop the subject.
    pub fn dispose(&self) {
        let observers = {
            let mut state = self.state.lock();
            if state.terminal.is_none() {
                state.terminal = Some(Terminal::Disposed);
            }
            std::mem::take(&mut state.observers)
        };
        drop(observers);
    }

    fn snapshot(&self) -> Option<Snapshot<T>> {
        let state = self.state.lock();
        if state.terminal.is_some() {
            return None;
        }
        Some(state.observers.values().cloned().collect())
    }

    /// Stop the subject with `terminal` and hand back the observers to notify.
    fn stop(&self, terminal: Terminal) -> Snapshot<T> {
        let mut state = self.state.lock();
        if state.terminal.is_some() {
            return SmallVec::new();
        }
        state.terminal = Some(terminal);
        std::mem::take(&mut state.observers).into_values().collect()
    }
}

impl<T> Default for Subject<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Observer<T> for Subject<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn on_next(&self, value: T) {
        let Some(observers) = self.snapshot() else {
            return;
        };
        for observer in observers {
            observer.on_next(value.clone());
        }
    }

    fn on_error(&self, error: StreamError) {
        for observer in self.stop(Terminal::Failed(error.clone())) {
            observer.on_error(error.clone());
        }
    }

    fn on_completed(&self) {
        for observer in self.stop(Terminal::Completed) {
            observer.on_completed();
        }
    }
}

impl<T> Observable<T> for Subject<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe(&self, observer: &Arc<dyn Observer<T>>) -> Subscription {
        let terminal = {
            let mut state = self.state.lock();
            match state.terminal.clone() {
                Some(terminal) => Some(terminal),
                None => {
                    let id = SubscriberId::new();
                    state.observers.insert(id, Arc::clone(observer));

                    let registry: Weak<Mutex<SubjectState<T>>> = Arc::downgrade(&self.state);
                    return Subscription::new(move || {
                        if let Some(registry) = registry.upgrade() {
                            // Bind the removed slot so it drops after the guard.
                            let removed = registry.lock().observers.shift_remove(&id);
                            drop(removed);
                        }
                    });
                }
            }
        };

        match terminal {
            Some(Terminal::Completed) => observer.on_completed(),
            Some(Terminal::Failed(error)) => observer.on_error(error),
            Some(Terminal::Disposed) | None => {}
        }
        Subscription::empty()
    }
}

impl<T> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Subject")
            .field("observer_count", &state.observers.len())
            .field("stopped", &state.terminal.is_some())
            .finish()
    }
}

/// A subject that remembers its latest value and replays it to every new
/// observer before any later value.
pub struct BehaviorSubject<T> {
    latest: Arc<Mutex<T>>,
    subject: Subject<T>,
}

impl<T> BehaviorSubject<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a behavior subject holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            latest: Arc::new(Mutex::new(initial)),
            subject: Subject::new(),
        }
    }

    /// The most recently pushed value.
    pub fn value(&self) -> T {
        self.latest.lock().clone()
    }

    /// Number of attached observers.
    pub fn observer_count(&self) -> usize {
        self.subject.observer_count()
    }

    /// Drop every observer without notifying it.
    pub fn dispose(&self) {
        self.subject.dispose();
    }
}

impl<T> Clone for BehaviorSubject<T> {
    fn clone(&self) -> Self {
        Self {
            latest: Arc::clone(&self.latest),
            subject: self.subject.clone(),
        }
    }
}

impl<T> Observer<T> for BehaviorSubject<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn on_next(&self, value: T) {
        *self.latest.lock() = value.clone();
        self.subject.on_next(value);
    }

    fn on_error(&self, error: StreamError) {
        self.subject.on_error(error);
    }

    fn on_completed(&self) {
        self.subject.on_completed();
    }
}

impl<T> Observable<T> for BehaviorSubject<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe(&self, observer: &Arc<dyn Observer<T>>) -> Subscription {
        if !self.subject.is_stopped() {
            observer.on_next(self.value());
        }
        self.subject.subscribe(observer)
    }
}

impl<T: fmt::Debug> fmt::Debug for BehaviorSubject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorSubject")
            .field("value", &*self.latest.lock())
            .field("subject", &self.subject)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{CallbackObserver, ObservableExt};
    use std::sync::atomic::{AtomicI32, Ordering};

    fn recorder() -> (Arc<Mutex<Vec<i32>>>, Arc<dyn Observer<i32>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer: Arc<dyn Observer<i32>> =
            Arc::new(CallbackObserver::new(move |v: i32| sink.lock().push(v)));
        (seen, observer)
    }

    #[test]
    fn subject_multicasts_in_order() {
        let subject = Subject::new();
        let (a, observer_a) = recorder();
        let (b, observer_b) = recorder();

        let _sa = subject.subscribe(&observer_a);
        let _sb = subject.subscribe(&observer_b);

        subject.on_next(1);
        subject.on_next(2);

        assert_eq!(*a.lock(), vec![1, 2]);
        assert_eq!(*b.lock(), vec![1, 2]);
        assert_eq!(subject.observer_count(), 2);
    }

    #[test]
    fn dropping_subscription_detaches() {
        let subject = Subject::new();
        let (seen, observer) = recorder();

        let sub = subject.subscribe(&observer);
        subject.on_next(1);
        drop(sub);
        subject.on_next(2);

        assert_eq!(*seen.lock(), vec![1]);
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn completion_is_terminal_and_replayed_to_late_observers() {
        let subject = Subject::<i32>::new();
        let completions = Arc::new(AtomicI32::new(0));

        let make_observer = |completions: Arc<AtomicI32>| -> Arc<dyn Observer<i32>> {
            Arc::new(
                CallbackObserver::<i32>::builder()
                    .on_next(|_| {})
                    .on_completed(move || {
                        completions.fetch_add(1, Ordering::SeqCst);
                    })
                    .build()
                    .unwrap(),
            )
        };

        let early = make_observer(completions.clone());
        let _sub = subject.subscribe(&early);
        subject.on_completed();
        subject.on_completed();
        assert_eq!(completions.load(Ordering::SeqCst), 1);

        let late = make_observer(completions.clone());
        let sub = subject.subscribe(&late);
        assert!(sub.is_disposed());
        assert_eq!(completions.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn disposed_subject_drops_values_silently() {
        let subject = Subject::new();
        let (seen, observer) = recorder();
        let _sub = subject.subscribe(&observer);

        subject.dispose();
        subject.on_next(5);

        assert!(seen.lock().is_empty());
        assert!(subject.is_stopped());
    }

    #[test]
    fn observer_may_unsubscribe_itself_during_delivery() {
        let subject = Subject::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let observer: Arc<dyn Observer<i32>> = Arc::new(CallbackObserver::new(move |_: i32| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = slot_clone.lock().take() {
                sub.dispose();
            }
        }));
        *slot.lock() = Some(subject.subscribe(&observer));

        subject.on_next(1);
        subject.on_next(2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn behavior_subject_replays_latest() {
        let subject = BehaviorSubject::new(10);
        subject.on_next(11);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = subject.subscribe_fn(move |v: i32| sink.lock().push(v));
        subject.on_next(12);

        assert_eq!(*seen.lock(), vec![11, 12]);
        assert_eq!(subject.value(), 12);
    }
}
