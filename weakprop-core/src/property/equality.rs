//! Equality comparers used by the distinct-until-changed gate.

use std::sync::Arc;

/// Decides whether two values are equal for gating purposes.
pub type Comparer<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Structural equality via `PartialEq`.
pub fn default_comparer<T: PartialEq + 'static>() -> Comparer<T> {
    Arc::new(|a: &T, b: &T| a == b)
}

/// Comparer for optional values.
///
/// `None`/`None` is equal and `None`/`Some` is different; only when both
/// sides are present is `inner` consulted.
pub fn optional_comparer<U, F>(inner: F) -> Comparer<Option<U>>
where
    U: 'static,
    F: Fn(&U, &U) -> bool + Send + Sync + 'static,
{
    Arc::new(move |a: &Option<U>, b: &Option<U>| match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => inner(a, b),
        _ => false,
    })
}
