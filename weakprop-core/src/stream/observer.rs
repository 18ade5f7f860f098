//! Closure-backed observers.

use std::fmt;

use super::{Observer, StreamError};
use crate::error::{PropertyError, Result};

type OnNext<T> = Box<dyn Fn(T) + Send + Sync>;
type OnError = Box<dyn Fn(StreamError) + Send + Sync>;
type OnCompleted = Box<dyn Fn() + Send + Sync>;

/// An observer assembled from closures.
///
/// Errors that reach an observer without an error handler are logged and
/// otherwise ignored; completion without a handler is a no-op.
pub struct CallbackObserver<T> {
    on_next: OnNext<T>,
    on_error: Option<OnError>,
    on_completed: Option<OnCompleted>,
}

impl<T> CallbackObserver<T> {
    /// Observer that only handles values.
    pub fn new<F>(on_next: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            on_next: Box::new(on_next),
            on_error: None,
            on_completed: None,
        }
    }

    /// Start wiring an observer callback by callback.
    pub fn builder() -> ObserverBuilder<T> {
        ObserverBuilder {
            on_next: None,
            on_error: None,
            on_completed: None,
        }
    }
}

impl<T: Send + Sync> Observer<T> for CallbackObserver<T> {
    fn on_next(&self, value: T) {
        (self.on_next)(value);
    }

    fn on_error(&self, error: StreamError) {
        match &self.on_error {
            Some(handler) => handler(error),
            None => tracing::error!(%error, "unhandled stream error"),
        }
    }

    fn on_completed(&self) {
        if let Some(handler) = &self.on_completed {
            handler();
        }
    }
}

impl<T> fmt::Debug for CallbackObserver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackObserver")
            .field("on_error", &self.on_error.is_some())
            .field("on_completed", &self.on_completed.is_some())
            .finish()
    }
}

/// Builder for [`CallbackObserver`].
///
/// `on_next` is required; [`build`](Self::build) fails with
/// [`PropertyError::InvalidArgument`] without it.
pub struct ObserverBuilder<T> {
    on_next: Option<OnNext<T>>,
    on_error: Option<OnError>,
    on_completed: Option<OnCompleted>,
}

impl<T> ObserverBuilder<T> {
    pub fn on_next<F>(mut self, f: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.on_next = Some(Box::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(StreamError) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_completed<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_completed = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Result<CallbackObserver<T>> {
        let on_next = self
            .on_next
            .ok_or(PropertyError::InvalidArgument("on_next"))?;
        Ok(CallbackObserver {
            on_next,
            on_error: self.on_error,
            on_completed: self.on_completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("boom")
        }
    }

    impl std::error::Error for Boom {}

    #[test]
    fn build_without_on_next_is_invalid() {
        let err = CallbackObserver::<i32>::builder()
            .on_completed(|| {})
            .build()
            .unwrap_err();
        assert_eq!(err, PropertyError::InvalidArgument("on_next"));
    }

    #[test]
    fn builder_wires_every_callback() {
        let errored = Arc::new(AtomicBool::new(false));
        let completed = Arc::new(AtomicBool::new(false));
        let errored_clone = errored.clone();
        let completed_clone = completed.clone();

        let observer = CallbackObserver::<i32>::builder()
            .on_next(|_| {})
            .on_error(move |e| {
                assert_eq!(e.to_string(), "boom");
                errored_clone.store(true, Ordering::SeqCst);
            })
            .on_completed(move || completed_clone.store(true, Ordering::SeqCst))
            .build()
            .unwrap();

        observer.on_error(Arc::new(Boom));
        observer.on_completed();

        assert!(errored.load(Ordering::SeqCst));
        assert!(completed.load(Ordering::SeqCst));
    }

    #[test]
    fn unhandled_error_does_not_panic() {
        let observer = CallbackObserver::new(|_: i32| {});
        observer.on_error(Arc::new(Boom));
        observer.on_completed();
    }
}
