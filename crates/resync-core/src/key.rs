//! Request key generation and normalization.

use std::fmt;

use serde::Serialize;

use crate::error::FetchError;

/// Canonical identity for one logical fetch operation.
///
/// A key is an operation identifier plus a normalized parameter set. Two keys
/// are equal iff both parts are equal; parameters are canonicalized through
/// `serde_json`, whose default map type sorts object keys, so structurally
/// equal parameter sets produce equal keys regardless of field order.
///
/// # Examples
///
/// ```
/// use resync_core::RequestKey;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct UserParams {
///     id: u64,
/// }
///
/// let key = RequestKey::with_params("user", &UserParams { id: 1 }).unwrap();
/// assert_eq!(key.operation(), "user");
/// assert_eq!(key.to_string(), r#"user?{"id":1}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    operation: String,
    params: Option<String>,
}

impl RequestKey {
    /// Creates a key for a parameterless operation.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            params: None,
        }
    }

    /// Creates a key for an operation with parameters.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::InvalidKey` if the parameters cannot be
    /// serialized to JSON.
    pub fn with_params<P: Serialize>(
        operation: impl Into<String>,
        params: &P,
    ) -> Result<Self, FetchError> {
        let value = serde_json::to_value(params)
            .map_err(|e| FetchError::InvalidKey(e.to_string()))?;

        let params = match &value {
            serde_json::Value::Null => None,
            _ => Some(value.to_string()),
        };

        Ok(Self {
            operation: operation.into(),
            params,
        })
    }

    /// Returns the operation identifier.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Returns the canonical parameter string, if any.
    pub fn params(&self) -> Option<&str> {
        self.params.as_deref()
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.params {
            Some(params) => write!(f, "{}?{}", self.operation, params),
            None => write!(f, "{}", self.operation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_key_without_params() {
        let key = RequestKey::new("users");
        assert_eq!(key.operation(), "users");
        assert!(key.params().is_none());
        assert_eq!(key.to_string(), "users");
    }

    #[test]
    fn test_key_params_are_canonical() {
        // Same parameter set built in different insertion orders
        let mut a = HashMap::new();
        a.insert("page", 2);
        a.insert("size", 50);

        let mut b = HashMap::new();
        b.insert("size", 50);
        b.insert("page", 2);

        let key_a = RequestKey::with_params("users", &a).unwrap();
        let key_b = RequestKey::with_params("users", &b).unwrap();

        assert_eq!(key_a, key_b);
        assert_eq!(key_a.to_string(), key_b.to_string());
    }

    #[test]
    fn test_null_params_equal_no_params() {
        let unit = RequestKey::with_params("users", &()).unwrap();
        let none = RequestKey::new("users");

        assert_eq!(unit, none);
    }

    #[test]
    fn test_key_hash() {
        use std::collections::HashSet;

        let key1 = RequestKey::with_params("user", &serde_json::json!({"id": 1})).unwrap();
        let key2 = RequestKey::with_params("user", &serde_json::json!({"id": 1})).unwrap();

        let mut set = HashSet::new();
        set.insert(key1);

        assert!(set.contains(&key2));
    }

    #[test]
    fn test_display_includes_params() {
        let key = RequestKey::with_params("user", &serde_json::json!({"id": 7})).unwrap();
        assert_eq!(key.to_string(), r#"user?{"id":7}"#);
    }
}
