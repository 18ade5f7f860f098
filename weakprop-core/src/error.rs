//! Error types.
//!
//! Validation failures are never reported through this type. They are data,
//! surfaced through [`crate::property::WeakProperty::current_errors`] and the
//! error-changed stream.

use thiserror::Error;

/// Errors raised by the property and stream layers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
    /// A required callback was not supplied when wiring an observer.
    #[error("invalid argument: `{0}` is required")]
    InvalidArgument(&'static str),

    /// The property has already been disposed.
    #[error("property has been disposed")]
    Disposed,

    /// An asynchronous validator was registered outside a Tokio runtime.
    #[error("no Tokio runtime is available to run asynchronous validators")]
    RuntimeUnavailable,
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = PropertyError> = std::result::Result<T, E>;
