//! Common types used throughout TACo storage.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Caller-facing identifier of a stored object.
///
/// Assigned once at store time and never changed afterwards. It is
/// independent of the backend reference the object is reachable under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Create an ObjectId from a caller-supplied string.
    ///
    /// # Errors
    /// - `InvalidConfig` if the id is empty or only whitespace
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(crate::Error::InvalidConfig(
                "Object id cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_object_id_creation() {
        let id = ObjectId::new("doc-1").unwrap();
        assert_eq!(id.as_str(), "doc-1");
        assert_eq!(id.to_string(), "doc-1");
    }

    #[test]
    fn test_object_id_empty_fails() {
        assert!(matches!(
            ObjectId::new(""),
            Err(crate::Error::InvalidConfig(_))
        ));
        assert!(ObjectId::new("   ").is_err());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = ObjectId::generate();
        let b = ObjectId::generate();
        assert_ne!(a, b);
        assert!(!a.as_str().is_empty());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = ObjectId::new("abc").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }

    proptest! {
        #[test]
        fn prop_non_blank_ids_are_accepted(s in "[a-zA-Z0-9_-]{1,32}") {
            let id = ObjectId::new(s.clone()).unwrap();
            prop_assert_eq!(id.into_inner(), s);
        }
    }
}
