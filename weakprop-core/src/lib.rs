//! weakprop Core
//!
//! This crate provides bindable reactive properties whose subscriptions never
//! keep their subscribers alive. It implements:
//!
//! - A minimal push-stream vocabulary (observers, observables, subjects)
//! - A weak observer adapter with lazy, on-delivery teardown
//! - [`WeakProperty`], an equality-gated value holder that raises change
//!   events through a pluggable scheduler
//! - A validation pipeline combining synchronous and asynchronous validators
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `stream`: observers, subscriptions, subjects, the weak adapter and the
//!   operators validation needs
//! - `scheduler`: where change events run
//! - `property`: the value holder and its validation pipeline
//! - `error`: the crate's error type
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use weakprop_core::prelude::*;
//!
//! let count = WeakProperty::new(0);
//!
//! // The observer is held weakly: keep it alive for as long as it should
//! // receive values.
//! let observer: Arc<dyn Observer<i32>> =
//!     Arc::new(CallbackObserver::new(|v: i32| println!("count = {v}")));
//! let _subscription = count.subscribe(&observer); // prints "count = 0"
//!
//! count.set_value(5); // prints "count = 5"
//! count.set_value(5); // suppressed: equal to the current value
//!
//! drop(observer);
//! count.set_value(6); // detaches the dead observer instead of printing
//! ```

pub mod error;
pub mod property;
pub mod scheduler;
pub mod stream;

pub use error::{PropertyError, Result};
pub use property::{PropertyMode, WeakProperty};

/// The types needed to work with properties and streams.
pub mod prelude {
    pub use crate::error::{PropertyError, Result};
    pub use crate::property::{
        ErrorsChanged, PropertyBuilder, PropertyChanged, PropertyConfig, PropertyMode,
        ValidationErrors, ValidationResult, WeakProperty,
    };
    pub use crate::scheduler::{ImmediateScheduler, QueueScheduler, Scheduler, TokioScheduler};
    pub use crate::stream::{
        weak_subscribe, BehaviorSubject, BoxObservable, CallbackObserver, Observable,
        ObservableExt, Observer, Subject, Subscription,
    };
}
