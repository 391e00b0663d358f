//! Storage adapter trait definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::metadata::{StorageMetadata, StorageResult};
use tacostore_common::{Error, Result};

/// Encrypted payload and metadata as held by a backend.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Serialized message kit, exactly as handed to `store`.
    pub encrypted_payload: Vec<u8>,
    /// Metadata recorded at store time.
    pub metadata: StorageMetadata,
}

/// Result of a health probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

impl HealthStatus {
    /// Healthy status with backend-specific details.
    pub fn healthy(details: Map<String, Value>) -> Self {
        Self {
            healthy: true,
            details: Some(details),
        }
    }

    /// Unhealthy status carrying `details.error`.
    pub fn unhealthy(error: impl fmt::Display) -> Self {
        let mut details = Map::new();
        details.insert("error".to_string(), Value::String(error.to_string()));
        Self {
            healthy: false,
            details: Some(details),
        }
    }

    /// Add a detail entry.
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value.into());
        self
    }

    /// The `details.error` entry, if any.
    pub fn error(&self) -> Option<&str> {
        self.details.as_ref()?.get("error")?.as_str()
    }
}

/// Contract every storage backend implements.
///
/// Adapters never see plaintext. `locator` arguments accept the logical id
/// given at store time as well as the adapter's own references; references
/// of other adapters are rejected.
///
/// Every operation except `health` and `cleanup` fails with `Adapter` until
/// `initialize` has succeeded.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Adapter name (e.g., "memory", "sqlite", "ipfs", "pinata").
    fn name(&self) -> &str;

    /// Scheme prefix of the references this adapter issues.
    fn scheme(&self) -> &str;

    /// Establish connectivity and schema.
    ///
    /// # Postconditions
    /// - Calling again is a no-op
    ///
    /// # Errors
    /// - `Adapter` if the backend cannot be reached or prepared
    async fn initialize(&self) -> Result<()>;

    /// Persist an encrypted payload with its metadata.
    ///
    /// # Preconditions
    /// - `payload` is non-empty
    /// - `metadata.id` is non-empty
    ///
    /// # Postconditions
    /// - The object is retrievable by the returned reference and by its id
    ///   as soon as this returns
    /// - A previous object with the same id is replaced
    ///
    /// # Errors
    /// - `Storage` for an empty payload or id, or a backend write failure
    async fn store(&self, payload: Vec<u8>, metadata: StorageMetadata) -> Result<StorageResult>;

    /// Fetch an object.
    ///
    /// # Errors
    /// - `NotFound` if nothing matches
    /// - `InvalidReference` if the locator does not fit this adapter's grammar
    /// - `Retrieval` for transport or format failures
    async fn retrieve(&self, locator: &str) -> Result<StoredObject>;

    /// Remove an object.
    ///
    /// Returns `false` if nothing matched. Errors are reserved for
    /// operational failures.
    async fn delete(&self, locator: &str) -> Result<bool>;

    /// Best-effort existence check.
    ///
    /// Returns `false` whenever existence cannot be proven, including for
    /// malformed locators.
    ///
    /// # Errors
    /// - `Adapter` if the adapter is not initialized
    async fn exists(&self, locator: &str) -> Result<bool>;

    /// Whether this adapter can enumerate stored ids.
    fn supports_list(&self) -> bool {
        false
    }

    /// Stored ids, oldest first, paged by `limit` and `offset`.
    ///
    /// # Errors
    /// - `Adapter` if listing is not supported
    async fn list(&self, _limit: Option<usize>, _offset: Option<usize>) -> Result<Vec<String>> {
        Err(Error::Adapter(format!(
            "{} adapter does not support listing",
            self.name()
        )))
    }

    /// Probe the backend.
    ///
    /// Probe failures are reported as `healthy: false` with `details.error`.
    async fn health(&self) -> Result<HealthStatus>;

    /// Release backend resources.
    ///
    /// Safe to call repeatedly and on a never-initialized adapter. The
    /// adapter must be initialized again before further use.
    async fn cleanup(&self) -> Result<()>;
}
