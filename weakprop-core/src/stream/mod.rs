//! Push-based Streams
//!
//! This module implements the small push-stream vocabulary the property layer
//! is built on: observers, observables, subscriptions, subjects, and the
//! weak observer adapter.
//!
//! # Concepts
//!
//! ## Observers and Observables
//!
//! An [`Observer`] receives three kinds of events: a value, an error, or
//! completion. An [`Observable`] is anything an observer can be attached to.
//! Attaching returns a [`Subscription`], a handle that detaches the observer
//! when disposed or dropped.
//!
//! ## Ownership
//!
//! `Observable::subscribe` takes the observer by reference. Whether the
//! producer keeps it alive is up to the producer: a [`Subject`] holds its
//! observers strongly, while [`weak_subscribe`] (and every
//! [`WeakProperty`](crate::property::WeakProperty)) holds them through a
//! `Weak` and drops the relationship the first time it finds the observer
//! gone.
//!
//! ## Operators
//!
//! Only the operators needed to drive validation are provided, in [`ops`]:
//! start-with, map, async map and combine-latest.

mod subscription;
mod subscriber;
mod subject;
mod observer;
mod weak;
pub mod ops;

use std::sync::Arc;

pub use subscription::Subscription;
pub use subscriber::SubscriberId;
pub(crate) use subscriber::HandlerRegistry;
pub use subject::{BehaviorSubject, Subject};
pub use observer::{CallbackObserver, ObserverBuilder};
pub use weak::{weak_subscribe, WeakObserver};

/// Error payload carried by a stream's error event.
pub type StreamError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// A shared, type-erased observable.
pub type BoxObservable<T> = Arc<dyn Observable<T>>;

/// The consumer side of a push-based stream.
pub trait Observer<T>: Send + Sync {
    /// A new value was produced.
    fn on_next(&self, value: T);

    /// The producer failed. No further events follow.
    fn on_error(&self, error: StreamError);

    /// The producer finished. No further events follow.
    fn on_completed(&self);
}

/// The producer side of a push-based stream.
pub trait Observable<T>: Send + Sync {
    /// Attach `observer` and return the handle that detaches it.
    fn subscribe(&self, observer: &Arc<dyn Observer<T>>) -> Subscription;
}

/// Convenience methods available on every observable.
pub trait ObservableExt<T>: Observable<T> {
    /// Attach `observer` without keeping it alive. See [`weak_subscribe`].
    fn weak_subscribe(&self, observer: &Arc<dyn Observer<T>>) -> Subscription
    where
        T: Send + Sync + 'static,
    {
        weak::weak_subscribe(self, observer)
    }

    /// Attach a concrete observer type without spelling out the coercion.
    fn subscribe_with<O>(&self, observer: &Arc<O>) -> Subscription
    where
        O: Observer<T> + 'static,
    {
        let observer: Arc<dyn Observer<T>> = observer.clone();
        self.subscribe(&observer)
    }

    /// Attach a closure as the value handler.
    ///
    /// The returned handle owns the closure, so the closure lives exactly as
    /// long as the handle.
    fn subscribe_fn<F>(&self, on_next: F) -> Subscription
    where
        F: Fn(T) + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let observer: Arc<dyn Observer<T>> = Arc::new(CallbackObserver::new(on_next));
        let inner = self.subscribe(&observer);
        Subscription::new(move || {
            inner.dispose();
            drop(observer);
        })
    }

    /// Drive a new [`WeakProperty`](crate::property::WeakProperty) from this
    /// stream.
    fn to_weak_property(
        &self,
        initial: T,
        mode: crate::property::PropertyMode,
    ) -> crate::property::WeakProperty<T>
    where
        Self: Sized,
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        crate::property::WeakProperty::builder(initial)
            .mode(mode)
            .build_from_source(self)
    }
}

impl<T, O: Observable<T> + ?Sized> ObservableExt<T> for O {}
