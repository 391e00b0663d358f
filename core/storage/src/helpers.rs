//! Validation and bookkeeping shared by the adapters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::metadata::StorageMetadata;
use crate::reference::{backend_scheme, Cid};
use tacostore_common::{Error, Result};

/// Initialization flag of an adapter.
#[derive(Debug)]
pub struct InitState {
    adapter: &'static str,
    initialized: AtomicBool,
}

impl InitState {
    pub fn new(adapter: &'static str) -> Self {
        Self {
            adapter,
            initialized: AtomicBool::new(false),
        }
    }

    /// Mark initialized. Returns `true` on the first call.
    pub fn mark_initialized(&self) -> bool {
        !self.initialized.swap(true, Ordering::AcqRel)
    }

    /// Mark uninitialized. Returns `true` if it was initialized.
    pub fn reset(&self) -> bool {
        self.initialized.swap(false, Ordering::AcqRel)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// # Errors
    /// - `Adapter` if not initialized
    pub fn ensure(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::Adapter(format!(
                "{} adapter is not initialized",
                self.adapter
            )))
        }
    }
}

/// # Errors
/// - `Storage` if the payload is empty
pub fn validate_payload(payload: &[u8]) -> Result<()> {
    if payload.is_empty() {
        return Err(Error::storage("Encrypted payload cannot be empty"));
    }
    Ok(())
}

/// # Errors
/// - `Storage` if the id is blank
pub fn validate_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::storage("Metadata id cannot be empty"));
    }
    Ok(())
}

/// Check the inputs of a `store` call.
pub fn validate_store(payload: &[u8], metadata: &StorageMetadata) -> Result<()> {
    validate_payload(payload)?;
    validate_id(&metadata.id)
}

/// Apply `offset` then `limit` to an ordered sequence.
pub fn paginate<T>(
    items: impl IntoIterator<Item = T>,
    limit: Option<usize>,
    offset: Option<usize>,
) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.unwrap_or(0))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Logical id to CID index of a content-addressed adapter.
#[derive(Debug, Default)]
pub struct CidIndex {
    entries: RwLock<HashMap<String, Cid>>,
}

impl CidIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id -> cid`, returning the CID it replaces.
    pub async fn insert(&self, id: &str, cid: Cid) -> Option<Cid> {
        self.entries.write().await.insert(id.to_string(), cid)
    }

    pub async fn get(&self, id: &str) -> Option<Cid> {
        self.entries.read().await.get(id).cloned()
    }

    /// Whether any id maps to `cid`.
    pub async fn contains_cid(&self, cid: &Cid) -> bool {
        self.entries.read().await.values().any(|c| c == cid)
    }

    /// Drop every id mapping to `cid`. Returns how many were dropped.
    pub async fn remove_cid(&self, cid: &Cid) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, c| c != cid);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Resolve a locator to a CID.
    ///
    /// The locator is looked up as a logical id first. Otherwise
    /// `ipfs://<cid>` references and bare CIDs resolve to themselves.
    /// Returns `None` for an unknown id.
    ///
    /// # Errors
    /// - `InvalidReference` for an empty locator, another backend's scheme
    ///   or a malformed CID reference
    pub async fn resolve(&self, locator: &str) -> Result<Option<Cid>> {
        if locator.trim().is_empty() {
            return Err(Error::InvalidReference("Locator cannot be empty".to_string()));
        }
        if let Some(cid) = self.get(locator).await {
            return Ok(Some(cid));
        }
        if backend_scheme(locator).is_some() {
            return Cid::from_locator(locator).map(Some);
        }
        Ok(Cid::parse(locator).ok())
    }
}
