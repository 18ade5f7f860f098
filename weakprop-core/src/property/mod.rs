//! Weak Reactive Properties
//!
//! A [`WeakProperty`] is a mutable value holder for data binding. It caches
//! the latest value, publishes changes to its subscribers, validates every
//! value it is given, and raises change events through a [`Scheduler`].
//!
//! # How a Set Works
//!
//! 1. The equality gate runs. Under
//!    [`PropertyMode::DISTINCT_UNTIL_CHANGED`] a value equal to the cached
//!    one is dropped here.
//!
//! 2. The cache is updated.
//!
//! 3. The value is pushed into the validation trigger, re-running every
//!    registered validator.
//!
//! 4. The value is broadcast to all live subscribers, synchronously.
//!
//! 5. A [`PropertyChanged`] event is *scheduled*. Handlers may therefore
//!    observe it after subscribers have already seen the value, on another
//!    thread.
//!
//! # Subscriptions Are Weak
//!
//! Subscribing never keeps the subscriber alive. Each subscriber is attached
//! through a [`weak_subscribe`] adapter: once the caller drops its last
//! `Arc` to the observer, the next broadcast detaches it. Dropping the
//! returned [`Subscription`] detaches it right away.
//!
//! # Disposal
//!
//! [`WeakProperty::dispose`] completes the value stream and releases the
//! validation pipeline, the error channel and any upstream source. It is
//! idempotent, and dropping the last handle to a property disposes it.
//! Mutating a disposed property is a logged no-op; the `try_*` variants
//! return [`PropertyError::Disposed`] instead.

mod equality;
mod mode;
mod validation;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{PropertyError, Result};
use crate::scheduler::{default_scheduler, Scheduler};
use crate::stream::{
    weak_subscribe, HandlerRegistry, Observable, Observer, StreamError, Subject, Subscription,
};

pub use equality::{default_comparer, optional_comparer, Comparer};
pub use mode::{PropertyConfig, PropertyMode};
pub use validation::{ErrorsChanged, ValidationErrors, ValidationResult, Validator};

use validation::{ErrorSink, ValidationState};

/// Name reported by change events: the bindable member is `Value`.
const VALUE_PROPERTY: &str = "Value";

/// Event raised (through the scheduler) after the value changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyChanged {
    pub property_name: &'static str,
}

impl PropertyChanged {
    pub const VALUE: Self = Self {
        property_name: VALUE_PROPERTY,
    };
}

/// Shared state behind every clone of a [`WeakProperty`].
struct PropertyInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    latest: Mutex<T>,
    mode: PropertyMode,
    comparer: Comparer<T>,
    scheduler: Arc<dyn Scheduler>,
    changes: Subject<T>,
    disposed: AtomicBool,

    /// Present only for source-driven properties.
    source: Mutex<Option<Subscription>>,
    /// Consumer handed to the upstream adapter. Owned here, held weakly there.
    source_sink: Arc<SourceSink<T>>,

    validation: ValidationState<T>,
    error_sink: Arc<ErrorSink<T>>,

    property_changed: HandlerRegistry<PropertyChanged>,
    errors_changed: HandlerRegistry<ErrorsChanged>,
}

impl<T> PropertyInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Gate, then publish. Returns whether anything was published.
    fn set_value(&self, value: T) -> Result<bool> {
        if self.is_disposed() {
            return Err(PropertyError::Disposed);
        }
        {
            let mut latest = self.latest.lock();
            if self.mode.contains(PropertyMode::DISTINCT_UNTIL_CHANGED)
                && (self.comparer)(&latest, &value)
            {
                return Ok(false);
            }
            *latest = value.clone();
        }
        self.publish(value);
        Ok(true)
    }

    /// Everything after the cache update: validate, broadcast, schedule.
    fn publish(&self, value: T) {
        tracing::trace!(subscribers = self.changes.observer_count(), "publishing value");
        self.validation.trigger.on_next(value.clone());
        self.changes.on_next(value);

        let handlers = self.property_changed.clone();
        self.scheduler
            .schedule(Box::new(move || handlers.emit(&PropertyChanged::VALUE)));
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("disposing property");

        self.changes.on_completed();
        self.changes.dispose();
        self.validation.trigger.dispose();

        let source = self.source.lock().take();
        drop(source);

        self.validation.dispose();
    }
}

impl<T> Drop for PropertyInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Consumer the property attaches to its upstream source.
struct SourceSink<T>
where
    T: Clone + Send + Sync + 'static,
{
    property: Weak<PropertyInner<T>>,
}

impl<T> Observer<T> for SourceSink<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn on_next(&self, value: T) {
        if let Some(property) = self.property.upgrade() {
            // A disposed property has already released its source.
            let _ = property.set_value(value);
        }
    }

    fn on_error(&self, error: StreamError) {
        if let Some(property) = self.property.upgrade() {
            property.changes.on_error(error);
        }
    }

    fn on_completed(&self) {
        // The property outlives its source; just let go of the upstream.
        if let Some(property) = self.property.upgrade() {
            let source = property.source.lock().take();
            drop(source);
        }
    }
}

/// A bindable value holder with weak subscriptions and validation.
///
/// Cloning a `WeakProperty` creates a new handle to the **same** property.
/// The property is disposed when the last handle is dropped.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use weakprop_core::prelude::*;
///
/// let name = WeakProperty::new(String::new());
/// name.validate_with(|v: &String| v.is_empty().then(|| "required".to_string()));
/// assert!(name.has_errors());
///
/// let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// let _sub = name.subscribe_fn(move |v: String| sink.lock().push(v));
///
/// name.set_value("Ada".to_string());
/// assert!(!name.has_errors());
/// assert_eq!(*seen.lock(), vec![String::new(), "Ada".to_string()]);
/// ```
pub struct WeakProperty<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<PropertyInner<T>>,
}

impl<T> WeakProperty<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a property with the default mode and the default scheduler.
    pub fn new(initial: T) -> Self {
        Self::builder(initial).build()
    }

    /// Create a property with explicit mode flags.
    pub fn with_mode(initial: T, mode: PropertyMode) -> Self {
        Self::builder(initial).mode(mode).build()
    }

    /// Create a property driven by `source`. Every value the source emits
    /// is applied as a [`set_value`](Self::set_value).
    pub fn from_source<O>(source: &O, initial: T) -> Self
    where
        O: Observable<T> + ?Sized,
    {
        Self::builder(initial).build_from_source(source)
    }

    /// Start configuring a property that compares values with `PartialEq`.
    pub fn builder(initial: T) -> PropertyBuilder<T> {
        PropertyBuilder::with_comparer(initial, default_comparer())
    }
}

impl<T> WeakProperty<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from_parts(
        initial: T,
        mode: PropertyMode,
        scheduler: Arc<dyn Scheduler>,
        comparer: Comparer<T>,
    ) -> Self {
        let inner = Arc::new_cyclic(|this: &Weak<PropertyInner<T>>| PropertyInner {
            latest: Mutex::new(initial),
            mode,
            comparer,
            scheduler,
            changes: Subject::new(),
            disposed: AtomicBool::new(false),
            source: Mutex::new(None),
            source_sink: Arc::new(SourceSink {
                property: this.clone(),
            }),
            validation: ValidationState::new(),
            error_sink: Arc::new(ErrorSink {
                property: this.clone(),
            }),
            property_changed: HandlerRegistry::new(),
            errors_changed: HandlerRegistry::new(),
        });
        Self { inner }
    }

    fn attach_source<O>(&self, source: &O)
    where
        O: Observable<T> + ?Sized,
    {
        let sink: Arc<dyn Observer<T>> = self.inner.source_sink.clone();
        let subscription = weak_subscribe(source, &sink);
        *self.inner.source.lock() = Some(subscription);
    }

    /// The latest value.
    pub fn value(&self) -> T {
        self.inner.latest.lock().clone()
    }

    /// Set the value, publishing it unless the equality gate suppresses it.
    ///
    /// On a disposed property this logs a warning and does nothing.
    pub fn set_value(&self, value: T) {
        if let Err(err) = self.inner.set_value(value) {
            tracing::warn!(%err, "set_value ignored");
        }
    }

    /// Like [`set_value`](Self::set_value), but reports whether the value
    /// was published and fails after disposal.
    pub fn try_set_value(&self, value: T) -> Result<bool> {
        self.inner.set_value(value)
    }

    /// Re-run every validator against the current value.
    ///
    /// Neither the value nor its subscribers are touched.
    pub fn force_validate(&self) {
        if self.is_disposed() {
            tracing::warn!("force_validate ignored on disposed property");
            return;
        }
        self.inner.validation.trigger.on_next(self.value());
    }

    /// Publish the current value again, bypassing the equality gate.
    pub fn force_notify(&self) {
        if self.is_disposed() {
            tracing::warn!("force_notify ignored on disposed property");
            return;
        }
        self.inner.publish(self.value());
    }

    /// Dispose the property. Calling this more than once has no effect.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    pub fn mode(&self) -> PropertyMode {
        self.inner.mode
    }

    /// The scheduler change events are raised on.
    pub fn scheduler(&self) -> Arc<dyn Scheduler> {
        Arc::clone(&self.inner.scheduler)
    }

    /// Number of subscribers currently attached to the value stream,
    /// including dead ones that have not been detached yet.
    pub fn subscriber_count(&self) -> usize {
        self.inner.changes.observer_count()
    }

    /// Register a handler for [`PropertyChanged`].
    ///
    /// Handlers run on the property's scheduler.
    pub fn on_property_changed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&PropertyChanged) + Send + Sync + 'static,
    {
        self.inner.property_changed.add(handler)
    }
}

impl<T> Observable<T> for WeakProperty<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Attach `observer` to the value stream without keeping it alive.
    ///
    /// Under [`PropertyMode::RAISE_LATEST_ON_SUBSCRIBE`] the current value is
    /// delivered before this returns. A disposed property completes the
    /// observer immediately.
    fn subscribe(&self, observer: &Arc<dyn Observer<T>>) -> Subscription {
        if self.is_disposed() {
            observer.on_completed();
            return Subscription::empty();
        }
        if self.inner.mode.contains(PropertyMode::RAISE_LATEST_ON_SUBSCRIBE) {
            observer.on_next(self.value());
        }
        weak_subscribe(&self.inner.changes, observer)
    }
}

impl<T> Clone for WeakProperty<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for WeakProperty<T>
where
    T: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakProperty")
            .field("value", &*self.inner.latest.lock())
            .field("mode", &self.inner.mode)
            .field("subscribers", &self.inner.changes)
            .field("property_changed_handlers", &self.inner.property_changed.len())
            .field("disposed", &self.inner.disposed.load(Ordering::SeqCst))
            .finish()
    }
}

impl<T> fmt::Display for WeakProperty<T>
where
    T: Clone + Send + Sync + fmt::Display + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &*self.inner.latest.lock())
    }
}

// ----------------------------------------------------------------------------
// Builder
// ----------------------------------------------------------------------------

/// Configures and creates a [`WeakProperty`].
pub struct PropertyBuilder<T> {
    initial: T,
    mode: PropertyMode,
    scheduler: Option<Arc<dyn Scheduler>>,
    comparer: Comparer<T>,
}

impl<T> PropertyBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Start configuring a property whose values are compared by `comparer`.
    /// Use this for value types without `PartialEq`.
    pub fn with_comparer(initial: T, comparer: Comparer<T>) -> Self {
        Self {
            initial,
            mode: PropertyMode::default(),
            scheduler: None,
            comparer,
        }
    }

    pub fn mode(mut self, mode: PropertyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn config(self, config: &PropertyConfig) -> Self {
        self.mode(config.mode())
    }

    /// Raise change events on `scheduler` instead of the process default.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn comparer(mut self, comparer: Comparer<T>) -> Self {
        self.comparer = comparer;
        self
    }

    pub fn build(self) -> WeakProperty<T> {
        let scheduler = self.scheduler.unwrap_or_else(default_scheduler);
        WeakProperty::from_parts(self.initial, self.mode, scheduler, self.comparer)
    }

    /// Build a property driven by `source`.
    ///
    /// The property attaches through a weak adapter: the source does not
    /// keep the property alive, and dropping the property detaches it.
    pub fn build_from_source<O>(self, source: &O) -> WeakProperty<T>
    where
        O: Observable<T> + ?Sized,
    {
        let property = self.build();
        property.attach_source(source);
        property
    }
}

impl<T: fmt::Debug> fmt::Debug for PropertyBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyBuilder")
            .field("initial", &self.initial)
            .field("mode", &self.mode)
            .field("custom_scheduler", &self.scheduler.is_some())
            .finish()
    }
}
