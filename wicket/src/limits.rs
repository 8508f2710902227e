//! Resource limits.
//!
//! Limits bound memory usage per request and per connection. They are
//! configured on the [`App`](crate::App) before it starts:
//!
//! ```rust
//! use wicket::{App, Limit};
//!
//! let app = App::new()
//!     .with_body_limit(Limit::Limited(1024 * 1024))
//!     .with_max_header_count(Limit::Limited(64));
//! ```
//!
//! Disabling a limit (`Limit::Unlimited`) removes the built-in bound and
//! should only be done for trusted peers, e.g. in tests.

/// Default request body limit, 5 MB
pub(crate) const DEFAULT_BODY_LIMIT: usize = 5 * 1024 * 1024;

/// Represents a configurable resource limit.
///
/// - [`Limit::Default`] uses the framework or transport default.
/// - [`Limit::Limited`] enforces an explicit upper bound.
/// - [`Limit::Unlimited`] disables the limit entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit<T> {
    /// Use the framework or transport default.
    Default,

    /// Enforce an explicit upper bound.
    Limited(T),

    /// Disable the limit entirely.
    Unlimited,
}

impl<T> Limit<T> {
    /// Returns `true` if this limit is disabled.
    #[inline(always)]
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Limit::Unlimited)
    }

    /// Returns `true` if this limit enforces an explicit bound.
    #[inline(always)]
    pub fn is_limited(&self) -> bool {
        matches!(self, Limit::Limited(_))
    }
}

impl Limit<usize> {
    /// Resolves the limit against a `default` value.
    ///
    /// Returns `None` when the limit is disabled.
    #[inline]
    pub fn resolve(self, default: usize) -> Option<usize> {
        match self {
            Limit::Default => Some(default),
            Limit::Limited(n) => Some(n),
            Limit::Unlimited => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_returns_true_for_unlimited_when_checks_is_unlimited() {
        let limit = Limit::<usize>::Unlimited;

        assert!(limit.is_unlimited());
        assert!(!limit.is_limited());
    }

    #[test]
    fn it_returns_true_for_limited_when_checks_is_limited() {
        let limit = Limit::<usize>::Limited(100);

        assert!(limit.is_limited());
        assert!(!limit.is_unlimited());
    }

    #[test]
    fn it_resolves_limits() {
        assert_eq!(Limit::Default.resolve(DEFAULT_BODY_LIMIT), Some(5242880));
        assert_eq!(Limit::Limited(10).resolve(DEFAULT_BODY_LIMIT), Some(10));
        assert_eq!(Limit::Unlimited.resolve(DEFAULT_BODY_LIMIT), None);
    }
}
