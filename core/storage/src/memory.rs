//! In-memory storage adapter for testing.

use async_trait::async_trait;
use serde_json::Map;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::adapter::{HealthStatus, StorageAdapter, StoredObject};
use crate::helpers::{paginate, validate_store, InitState};
use crate::metadata::{StorageMetadata, StorageResult};
use crate::reference::{resolve_keyed, Reference, MEMORY_SCHEME};
use tacostore_common::{Error, Result};

const SCHEME: &str = MEMORY_SCHEME;

/// In-memory storage entry.
#[derive(Debug, Clone)]
struct Entry {
    payload: Vec<u8>,
    metadata: StorageMetadata,
}

/// In-memory storage adapter.
///
/// Useful for testing and development. All data is lost on cleanup or drop.
/// References look like `memory://<instance>#<id>`; each instance has its
/// own random location so references never resolve across instances.
pub struct MemoryAdapter {
    instance: String,
    state: InitState,
    objects: RwLock<HashMap<String, Entry>>,
}

impl MemoryAdapter {
    /// Create a new empty memory adapter.
    pub fn new() -> Self {
        Self {
            instance: Uuid::new_v4().to_string(),
            state: InitState::new(SCHEME),
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Key of the object `locator` names. A stored id wins over any
    /// reference reading of the same string.
    fn resolve<'a>(&self, objects: &HashMap<String, Entry>, locator: &'a str) -> Result<&'a str> {
        if objects.contains_key(locator) {
            return Ok(locator);
        }
        resolve_keyed(SCHEME, &self.instance, locator)
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    fn name(&self) -> &str {
        "memory"
    }

    fn scheme(&self) -> &str {
        SCHEME
    }

    async fn initialize(&self) -> Result<()> {
        if self.state.mark_initialized() {
            debug!(instance = %self.instance, "Memory adapter initialized");
        }
        Ok(())
    }

    async fn store(&self, payload: Vec<u8>, metadata: StorageMetadata) -> Result<StorageResult> {
        self.state.ensure()?;
        validate_store(&payload, &metadata)?;

        let id = metadata.id.clone();
        let entry = Entry {
            payload,
            metadata: metadata.clone(),
        };
        self.objects.write().await.insert(id.clone(), entry);

        Ok(StorageResult {
            reference: Reference::format(SCHEME, &self.instance, Some(&id)),
            id,
            metadata,
        })
    }

    async fn retrieve(&self, locator: &str) -> Result<StoredObject> {
        self.state.ensure()?;

        let objects = self.objects.read().await;
        let id = self.resolve(&objects, locator)?;
        match objects.get(id) {
            Some(entry) => Ok(StoredObject {
                encrypted_payload: entry.payload.clone(),
                metadata: entry.metadata.clone(),
            }),
            None => Err(Error::NotFound(format!("Object not found: {}", id))),
        }
    }

    async fn delete(&self, locator: &str) -> Result<bool> {
        self.state.ensure()?;
        let mut objects = self.objects.write().await;
        let Ok(id) = self.resolve(&objects, locator) else {
            return Ok(false);
        };
        Ok(objects.remove(id).is_some())
    }

    async fn exists(&self, locator: &str) -> Result<bool> {
        self.state.ensure()?;
        let objects = self.objects.read().await;
        let Ok(id) = self.resolve(&objects, locator) else {
            return Ok(false);
        };
        Ok(objects.contains_key(id))
    }

    fn supports_list(&self) -> bool {
        true
    }

    async fn list(&self, limit: Option<usize>, offset: Option<usize>) -> Result<Vec<String>> {
        self.state.ensure()?;

        let objects = self.objects.read().await;
        let mut entries: Vec<&StorageMetadata> = objects.values().map(|e| &e.metadata).collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        Ok(paginate(entries, limit, offset)
            .into_iter()
            .map(|m| m.id.clone())
            .collect())
    }

    async fn health(&self) -> Result<HealthStatus> {
        if !self.state.is_initialized() {
            return Ok(HealthStatus::unhealthy("memory adapter is not initialized"));
        }
        let count = self.objects.read().await.len();
        Ok(HealthStatus::healthy(Map::new())
            .with_detail("objects", count)
            .with_detail("instance", self.instance.clone()))
    }

    async fn cleanup(&self) -> Result<()> {
        if self.state.reset() {
            self.objects.write().await.clear();
            debug!(instance = %self.instance, "Memory adapter cleaned up");
        }
        Ok(())
    }
}
