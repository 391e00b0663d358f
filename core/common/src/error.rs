//! Common error types for TACo storage.
//!
//! Errors fall into two groups. The typed kinds (`InvalidConfig`, `Encryption`,
//! `Decryption`, `Storage`, `Retrieval`, `NotFound`, `InvalidReference`,
//! `Adapter`) are part of the public contract and cross layer boundaries
//! unchanged. The remaining variants are internal failures that the
//! orchestrator wraps exactly once into a typed kind.

use thiserror::Error;

/// Boxed error used as a chained cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for TACo storage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad caller input: empty data or id, malformed address, past expiry.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Encryption failed.
    #[error("Encryption error: {message}")]
    Encryption {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Decryption failed, including unsatisfied access conditions.
    #[error("Decryption error: {message}")]
    Decryption {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Write path failure.
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Read path failure.
    #[error("Retrieval error: {message}")]
    Retrieval {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The backend affirmatively reported absence.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Locator does not match the backend's reference grammar.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Operational or configuration failure of the backend itself.
    #[error("Adapter error: {0}")]
    Adapter(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport failure talking to a remote backend.
    #[error("Network error: {0}")]
    Network(String),

    /// Failure reported by a backend driver (database, HTTP API).
    #[error("{backend} backend error: {source}")]
    Backend {
        backend: &'static str,
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// Build an encryption error without a chained cause.
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption {
            message: message.into(),
            source: None,
        }
    }

    /// Build a decryption error without a chained cause.
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption {
            message: message.into(),
            source: None,
        }
    }

    /// Build a storage error without a chained cause.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Build a retrieval error without a chained cause.
    pub fn retrieval(message: impl Into<String>) -> Self {
        Self::Retrieval {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a driver error reported by `backend`.
    pub fn backend(
        backend: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            backend,
            source: Box::new(source),
        }
    }

    /// Whether this error is one of the public typed kinds.
    pub fn is_typed(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_)
                | Self::Encryption { .. }
                | Self::Decryption { .. }
                | Self::Storage { .. }
                | Self::Retrieval { .. }
                | Self::NotFound(_)
                | Self::InvalidReference(_)
                | Self::Adapter(_)
        )
    }

    /// Whether the backend reported the object as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Wrap an untyped error as `Storage`, keeping it as the cause.
    ///
    /// Typed errors are returned unchanged.
    pub fn into_storage(self, context: &str) -> Self {
        if self.is_typed() {
            return self;
        }
        Self::Storage {
            message: format!("{}: {}", context, self),
            source: Some(Box::new(self)),
        }
    }

    /// Wrap an untyped error as `Retrieval`, keeping it as the cause.
    ///
    /// Typed errors are returned unchanged.
    pub fn into_retrieval(self, context: &str) -> Self {
        if self.is_typed() {
            return self;
        }
        Self::Retrieval {
            message: format!("{}: {}", context, self),
            source: Some(Box::new(self)),
        }
    }

    /// Wrap an untyped error as `Encryption`, keeping it as the cause.
    pub fn into_encryption(self, context: &str) -> Self {
        if self.is_typed() {
            return self;
        }
        Self::Encryption {
            message: format!("{}: {}", context, self),
            source: Some(Box::new(self)),
        }
    }

    /// Wrap an untyped error as `Decryption`, keeping it as the cause.
    pub fn into_decryption(self, context: &str) -> Self {
        if self.is_typed() {
            return self;
        }
        Self::Decryption {
            message: format!("{}: {}", context, self),
            source: Some(Box::new(self)),
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
