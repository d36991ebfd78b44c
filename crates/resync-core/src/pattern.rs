//! Invalidation patterns with glob support.

use std::fmt;

use glob::Pattern;

use crate::error::FetchError;
use crate::key::RequestKey;

/// A pattern selecting request keys for invalidation.
///
/// Patterns match against the key's canonical string form
/// (`operation` or `operation?params`):
///
/// - [`KeyPattern::exact`] matches a single key.
/// - [`KeyPattern::operation`] matches every key for an operation
///   identifier, regardless of parameters.
/// - [`KeyPattern::glob`] matches with `*`/`?` wildcards.
///
/// # Examples
///
/// ```
/// use resync_core::{KeyPattern, RequestKey};
///
/// let key = RequestKey::with_params("user", &serde_json::json!({"id": 1})).unwrap();
///
/// assert!(KeyPattern::operation("user").matches(&key));
/// assert!(KeyPattern::glob("user?*").unwrap().matches(&key));
/// assert!(!KeyPattern::operation("post").matches(&key));
/// ```
#[derive(Debug, Clone)]
pub enum KeyPattern {
    /// Matches exactly one key.
    Exact(RequestKey),
    /// Matches every key with the given operation identifier.
    Operation(String),
    /// Matches keys whose canonical form matches a glob pattern.
    Glob(Pattern),
}

impl KeyPattern {
    /// Creates a pattern matching a single key.
    pub fn exact(key: RequestKey) -> Self {
        Self::Exact(key)
    }

    /// Creates a pattern matching all keys for an operation identifier.
    pub fn operation(operation: impl Into<String>) -> Self {
        Self::Operation(operation.into())
    }

    /// Creates a glob pattern over the canonical key form.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::InvalidPattern` if the glob syntax is invalid.
    pub fn glob(pattern: &str) -> Result<Self, FetchError> {
        let pattern =
            Pattern::new(pattern).map_err(|e| FetchError::InvalidPattern(e.to_string()))?;
        Ok(Self::Glob(pattern))
    }

    /// Returns true if the given key matches this pattern.
    pub fn matches(&self, key: &RequestKey) -> bool {
        match self {
            Self::Exact(exact) => exact == key,
            Self::Operation(operation) => key.operation() == operation,
            Self::Glob(pattern) => pattern.matches(&key.to_string()),
        }
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(key) => write!(f, "{}", key),
            Self::Operation(operation) => write!(f, "{}?*", operation),
            Self::Glob(pattern) => write!(f, "{}", pattern.as_str()),
        }
    }
}
