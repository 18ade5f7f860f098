//! Validation Pipeline
//!
//! Validators are functions from the stream of values to a stream of
//! [`ValidationResult`]s. A property keeps every validator it is given and,
//! on each registration, rebuilds one combined pipeline from all of them:
//!
//! ```text
//! trigger (seeded with the current value)
//!     ├─ validator 0 ─┐
//!     ├─ validator 1 ─┼─ combine_latest ─ aggregate ─ current errors
//!     └─ validator n ─┘                              ├─ error channel
//!                                                    └─ ErrorsChanged (scheduled)
//! ```
//!
//! The combined pipeline is held in a single slot. Registering a validator
//! subscribes the new pipeline first and then drops the previous one, so
//! pipelines are replaced rather than accumulated.
//!
//! # Aggregation
//!
//! When every validator's latest result is valid there are no errors.
//! Otherwise the error set lists the single-message results first, in
//! registration order, followed by the flattened item lists, also in
//! registration order. Empty messages and empty item lists count as valid.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use super::{PropertyInner, WeakProperty, VALUE_PROPERTY};
use crate::error::{PropertyError, Result};
use crate::stream::ops::{self, BoxFuture};
use crate::stream::{
    weak_subscribe, BehaviorSubject, BoxObservable, Observer, StreamError, Subject, Subscription,
};

/// Maps the value stream to a stream of validation results.
pub type Validator<T> =
    Arc<dyn Fn(BoxObservable<T>) -> BoxObservable<ValidationResult> + Send + Sync>;

/// Outcome of validating one value with one validator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationResult {
    /// No error.
    #[default]
    Valid,
    /// A single error message.
    Message(String),
    /// Several error items.
    Items(Vec<String>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Valid => true,
            Self::Message(message) => message.is_empty(),
            Self::Items(items) => items.is_empty(),
        }
    }
}

impl From<Option<String>> for ValidationResult {
    fn from(message: Option<String>) -> Self {
        message.map_or(Self::Valid, Self::Message)
    }
}

impl From<String> for ValidationResult {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<&str> for ValidationResult {
    fn from(message: &str) -> Self {
        Self::Message(message.to_owned())
    }
}

impl From<Vec<String>> for ValidationResult {
    fn from(items: Vec<String>) -> Self {
        Self::Items(items)
    }
}

/// The aggregated, non-empty error set of a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<String>);

impl ValidationErrors {
    pub fn messages(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("; "))
    }
}

/// Event raised (through the scheduler) after the error set is recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorsChanged {
    pub property_name: &'static str,
}

impl ErrorsChanged {
    pub const VALUE: Self = Self {
        property_name: VALUE_PROPERTY,
    };
}

/// Merge the latest result of every validator into one error set.
pub(crate) fn aggregate(results: &[ValidationResult]) -> Option<ValidationErrors> {
    if results.iter().all(ValidationResult::is_valid) {
        return None;
    }

    let messages = results.iter().filter_map(|result| match result {
        ValidationResult::Message(message) if !message.is_empty() => Some(message.clone()),
        _ => None,
    });
    let items = results
        .iter()
        .filter_map(|result| match result {
            ValidationResult::Items(items) => Some(items),
            _ => None,
        })
        .flatten()
        .cloned();

    Some(ValidationErrors(messages.chain(items).collect()))
}

/// Validation state owned by a property.
pub(super) struct ValidationState<T> {
    pub(super) trigger: Subject<T>,
    validators: Mutex<Vec<Validator<T>>>,
    pipeline: Mutex<Option<Subscription>>,
    current: Mutex<Option<ValidationErrors>>,
    channel: Mutex<Option<BehaviorSubject<Option<ValidationErrors>>>>,
}

impl<T> ValidationState<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(super) fn new() -> Self {
        Self {
            trigger: Subject::new(),
            validators: Mutex::new(Vec::new()),
            pipeline: Mutex::new(None),
            current: Mutex::new(None),
            channel: Mutex::new(None),
        }
    }

    pub(super) fn dispose(&self) {
        let pipeline = self.pipeline.lock().take();
        drop(pipeline);

        let channel = self.channel.lock().take();
        if let Some(channel) = channel {
            channel.on_completed();
            channel.dispose();
        }
    }
}

/// Consumer of the combined pipeline. Owned by the property, held weakly by
/// the pipeline's adapter.
pub(super) struct ErrorSink<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(super) property: Weak<PropertyInner<T>>,
}

impl<T> Observer<Vec<ValidationResult>> for ErrorSink<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn on_next(&self, results: Vec<ValidationResult>) {
        if let Some(property) = self.property.upgrade() {
            property.apply_errors(aggregate(&results));
        }
    }

    fn on_error(&self, error: StreamError) {
        tracing::warn!(%error, "validation pipeline failed");
    }

    fn on_completed(&self) {}
}

impl<T> PropertyInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Cache, schedule the event, then publish to the error channel.
    fn apply_errors(&self, errors: Option<ValidationErrors>) {
        tracing::trace!(errors = errors.as_ref().map_or(0, ValidationErrors::len), "validated");
        *self.validation.current.lock() = errors.clone();

        if !self.errors_changed.is_empty() {
            let handlers = self.errors_changed.clone();
            self.scheduler
                .schedule(Box::new(move || handlers.emit(&ErrorsChanged::VALUE)));
        }

        let channel = self.validation.channel.lock().clone();
        if let Some(channel) = channel {
            channel.on_next(errors);
        }
    }
}

impl<T> WeakProperty<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Register a stream validator and rebuild the validation pipeline.
    ///
    /// The validator receives the value stream, starting with the current
    /// value, and returns a stream of results.
    pub fn add_validator<F>(&self, validator: F) -> &Self
    where
        F: Fn(BoxObservable<T>) -> BoxObservable<ValidationResult> + Send + Sync + 'static,
    {
        if self.is_disposed() {
            tracing::warn!("add_validator ignored on disposed property");
            return self;
        }
        self.inner.validation.validators.lock().push(Arc::new(validator));
        self.recompose();
        self
    }

    /// Register a synchronous validator returning at most one message.
    pub fn validate_with<F>(&self, validator: F) -> &Self
    where
        F: Fn(&T) -> Option<String> + Send + Sync + 'static,
    {
        self.add_sync(validator)
    }

    /// Register a synchronous validator returning any number of items.
    pub fn validate_items_with<F>(&self, validator: F) -> &Self
    where
        F: Fn(&T) -> Vec<String> + Send + Sync + 'static,
    {
        self.add_sync(validator)
    }

    /// Register an asynchronous validator returning at most one message.
    ///
    /// Validations run as tasks on the Tokio runtime current at the time of
    /// this call; outside a runtime this fails with
    /// [`PropertyError::RuntimeUnavailable`].
    pub fn validate_async<F, Fut>(&self, validator: F) -> Result<&Self>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        self.add_async(validator)
    }

    /// Register an asynchronous validator returning any number of items.
    pub fn validate_items_async<F, Fut>(&self, validator: F) -> Result<&Self>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Vec<String>> + Send + 'static,
    {
        self.add_async(validator)
    }

    fn add_sync<F, R>(&self, validator: F) -> &Self
    where
        F: Fn(&T) -> R + Send + Sync + 'static,
        R: Into<ValidationResult>,
    {
        let validator = Arc::new(validator);
        self.add_validator(move |values| {
            let validator = Arc::clone(&validator);
            ops::map(values, move |value: T| -> ValidationResult { validator(&value).into() })
        })
    }

    fn add_async<F, Fut, R>(&self, validator: F) -> Result<&Self>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Into<ValidationResult> + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| PropertyError::RuntimeUnavailable)?;
        let validator = Arc::new(validator);
        Ok(self.add_validator(move |values| {
            let validator = Arc::clone(&validator);
            ops::map_async(values, runtime.clone(), move |value: T| {
                let pending = validator(value);
                let checked: BoxFuture<ValidationResult> = Box::pin(async move {
                    let result: ValidationResult = pending.await.into();
                    result
                });
                checked
            })
        }))
    }

    fn recompose(&self) {
        let validators = self.inner.validation.validators.lock().clone();
        let trigger: BoxObservable<T> = Arc::new(self.inner.validation.trigger.clone());
        let seeded = ops::start_with(trigger, self.value());

        let results = validators
            .iter()
            .map(|validator| validator(Arc::clone(&seeded)))
            .collect();
        let combined = ops::combine_latest(results);

        let sink: Arc<dyn Observer<Vec<ValidationResult>>> = self.inner.error_sink.clone();
        let subscription = weak_subscribe(&*combined, &sink);
        let previous = self.inner.validation.pipeline.lock().replace(subscription);
        drop(previous);

        tracing::debug!(validators = validators.len(), "validation pipeline recomposed");
    }

    /// The current error set, or `None` when the value is valid.
    pub fn current_errors(&self) -> Option<ValidationErrors> {
        self.inner.validation.current.lock().clone()
    }

    pub fn has_errors(&self) -> bool {
        self.inner.validation.current.lock().is_some()
    }

    /// Stream of error sets, starting with the current one.
    pub fn observe_errors(&self) -> BoxObservable<Option<ValidationErrors>> {
        let mut slot = self.inner.validation.channel.lock();
        if let Some(channel) = slot.as_ref() {
            return Arc::new(channel.clone());
        }

        let channel = BehaviorSubject::new(self.current_errors());
        if self.is_disposed() {
            channel.on_completed();
        } else {
            *slot = Some(channel.clone());
        }
        Arc::new(channel)
    }

    /// Stream of `has_errors`, starting with the current state.
    pub fn observe_has_errors(&self) -> BoxObservable<bool> {
        ops::map(self.observe_errors(), |errors: Option<ValidationErrors>| {
            errors.is_some()
        })
    }

    /// Register a handler for [`ErrorsChanged`].
    ///
    /// Handlers run on the property's scheduler.
    pub fn on_errors_changed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ErrorsChanged) + Send + Sync + 'static,
    {
        self.inner.errors_changed.add(handler)
    }
}
