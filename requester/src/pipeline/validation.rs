//! Status code validation.

use std::fmt;
use std::sync::Arc;

/// Which status codes count as success.
#[derive(Clone, Default)]
pub enum StatusValidation {
    /// 200 through 299.
    #[default]
    Default,
    /// Every status code is accepted.
    None,
    /// A caller-supplied predicate.
    Custom(Arc<dyn Fn(u16) -> bool + Send + Sync>),
}

impl StatusValidation {
    /// Wraps a predicate.
    #[must_use]
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(u16) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// Accepts exactly the given codes.
    #[must_use]
    pub fn only(codes: &[u16]) -> Self {
        let codes = codes.to_vec();
        Self::custom(move |code| codes.contains(&code))
    }

    /// Returns true if `status_code` passes.
    #[must_use]
    pub fn is_valid(&self, status_code: u16) -> bool {
        match self {
            Self::Default => (200..=299).contains(&status_code),
            Self::None => true,
            Self::Custom(predicate) => predicate(status_code),
        }
    }
}

impl fmt::Debug for StatusValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("Default"),
            Self::None => f.write_str("None"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
