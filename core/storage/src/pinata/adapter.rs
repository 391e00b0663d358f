//! Pinata storage adapter.

use async_trait::async_trait;
use serde_json::Map;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::client::{HttpPinataClient, PinataApi, PinataConfig, PinnedItem};
use crate::adapter::{HealthStatus, StorageAdapter, StoredObject};
use crate::helpers::{paginate, validate_store, CidIndex, InitState};
use crate::metadata::{StorageMetadata, StorageResult, StoredEnvelope};
use crate::reference::{Cid, IPFS_SCHEME};
use tacostore_common::{Error, Result};

/// Items requested per pin list page.
const PIN_PAGE_SIZE: usize = 1000;

/// Pinata storage adapter.
///
/// Each store pins a JSON envelope named after the logical id. Lookups by id
/// go through a local index first and fall back to the pin list's metadata
/// name, so objects stored by another process resolve too.
pub struct PinataAdapter {
    client: Arc<dyn PinataApi>,
    state: InitState,
    index: CidIndex,
}

impl PinataAdapter {
    /// Create an adapter for the Pinata account behind `config.jwt`.
    ///
    /// # Errors
    /// - `InvalidConfig` for a blank JWT or malformed URLs
    pub fn new(config: PinataConfig) -> Result<Self> {
        let client = HttpPinataClient::new(&config)?;
        Ok(Self::with_client(Arc::new(client)))
    }

    /// Create an adapter over any Pinata client.
    pub fn with_client(client: Arc<dyn PinataApi>) -> Self {
        Self {
            client,
            state: InitState::new("pinata"),
            index: CidIndex::new(),
        }
    }

    /// Resolve a locator, asking the pin list when the id is not indexed.
    async fn locate(&self, locator: &str) -> Result<Option<Cid>> {
        if let Some(cid) = self.index.resolve(locator).await? {
            return Ok(Some(cid));
        }
        let found = self.client.find_by_name(locator).await?;
        if let Some(cid) = &found {
            self.index.insert(locator, cid.clone()).await;
        }
        Ok(found)
    }

    async fn all_pins(&self) -> Result<Vec<PinnedItem>> {
        let mut pins = Vec::new();
        loop {
            let page = self.client.list_pins(PIN_PAGE_SIZE, pins.len()).await?;
            let done = page.len() < PIN_PAGE_SIZE;
            pins.extend(page);
            if done {
                return Ok(pins);
            }
        }
    }
}

#[async_trait]
impl StorageAdapter for PinataAdapter {
    fn name(&self) -> &str {
        "pinata"
    }

    fn scheme(&self) -> &str {
        IPFS_SCHEME
    }

    async fn initialize(&self) -> Result<()> {
        if self.state.is_initialized() {
            return Ok(());
        }
        self.client
            .test_authentication()
            .await
            .map_err(|e| Error::Adapter(format!("Pinata authentication failed: {}", e)))?;
        if self.state.mark_initialized() {
            info!("Pinata adapter initialized");
        }
        Ok(())
    }

    async fn store(&self, payload: Vec<u8>, metadata: StorageMetadata) -> Result<StorageResult> {
        self.state.ensure()?;
        validate_store(&payload, &metadata)?;

        let envelope = StoredEnvelope {
            data: payload,
            metadata: StorageMetadata {
                backend_hash: None,
                ..metadata
            },
        };
        let pinned = self
            .client
            .pin_json(&envelope.metadata.id, envelope.to_value()?)
            .await
            .map_err(|e| e.into_storage("Failed to pin to Pinata"))?;
        let cid = Cid::parse(&pinned.ipfs_hash).map_err(|e| Error::Storage {
            message: format!("Pinata returned an invalid CID: {}", pinned.ipfs_hash),
            source: Some(Box::new(e)),
        })?;

        let mut metadata = envelope.metadata;
        metadata.backend_hash = Some(cid.to_string());

        if let Some(previous) = self.index.insert(&metadata.id, cid.clone()).await {
            if previous != cid && !self.index.contains_cid(&previous).await {
                if let Err(e) = self.client.unpin(&previous).await {
                    warn!(cid = %previous, error = %e, "Failed to unpin replaced Pinata object");
                }
            }
        }

        debug!(id = %metadata.id, cid = %cid, size = pinned.pin_size, "Pinned object on Pinata");

        Ok(StorageResult {
            id: metadata.id.clone(),
            reference: cid.to_reference(),
            metadata,
        })
    }

    async fn retrieve(&self, locator: &str) -> Result<StoredObject> {
        self.state.ensure()?;
        let cid = self
            .locate(locator)
            .await
            .map_err(|e| e.into_retrieval("Failed to resolve Pinata object"))?
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}", locator)))?;

        let bytes = self
            .client
            .fetch(&cid)
            .await
            .map_err(|e| e.into_retrieval("Failed to fetch from Pinata gateway"))?;
        let envelope = StoredEnvelope::from_bytes(&bytes)?;

        let mut metadata = envelope.metadata;
        metadata.backend_hash = Some(cid.to_string());
        Ok(StoredObject {
            encrypted_payload: envelope.data,
            metadata,
        })
    }

    async fn delete(&self, locator: &str) -> Result<bool> {
        self.state.ensure()?;
        let cid = match self.locate(locator).await {
            Ok(Some(cid)) => cid,
            Ok(None) | Err(Error::InvalidReference(_)) => return Ok(false),
            Err(e) => return Err(e.into_storage("Failed to resolve Pinata object")),
        };

        let unpinned = self
            .client
            .unpin(&cid)
            .await
            .map_err(|e| e.into_storage("Failed to unpin from Pinata"))?;
        let forgotten = self.index.remove_cid(&cid).await;

        debug!(cid = %cid, unpinned, forgotten, "Unpinned object from Pinata");
        Ok(unpinned || forgotten > 0)
    }

    async fn exists(&self, locator: &str) -> Result<bool> {
        self.state.ensure()?;
        match self.locate(locator).await {
            Ok(Some(cid)) => Ok(self.index.contains_cid(&cid).await),
            Ok(None) => Ok(false),
            Err(e) => {
                debug!(locator = %locator, error = %e, "Pinata existence check failed");
                Ok(false)
            }
        }
    }

    fn supports_list(&self) -> bool {
        true
    }

    async fn list(&self, limit: Option<usize>, offset: Option<usize>) -> Result<Vec<String>> {
        self.state.ensure()?;

        let mut pins: Vec<(_, String)> = self
            .all_pins()
            .await
            .map_err(|e| e.into_retrieval("Failed to list Pinata pins"))?
            .into_iter()
            .filter_map(|pin| Some((pin.date_pinned, pin.name?)))
            .collect();
        pins.sort();

        let mut seen = HashSet::new();
        let ids = pins
            .into_iter()
            .map(|(_, name)| name)
            .filter(|name| seen.insert(name.clone()));
        Ok(paginate(ids, limit, offset))
    }

    async fn health(&self) -> Result<HealthStatus> {
        if !self.state.is_initialized() {
            return Ok(HealthStatus::unhealthy("pinata adapter is not initialized"));
        }
        let status = match self.client.test_authentication().await {
            Ok(message) => HealthStatus::healthy(Map::new())
                .with_detail("message", message)
                .with_detail("indexed", self.index.len().await),
            Err(e) => HealthStatus::unhealthy(e),
        };
        Ok(status)
    }

    async fn cleanup(&self) -> Result<()> {
        if self.state.reset() {
            self.index.clear().await;
            debug!("Pinata adapter cleaned up");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tests::sample_metadata;
    use crate::pinata::PinResponse;
    use chrono::{Duration, Utc};
    use serde_json::Value;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    /// Pinning service double keyed by CID.
    #[derive(Default)]
    struct FakePinata {
        pins: RwLock<HashMap<Cid, PinnedItem>>,
        content: RwLock<HashMap<Cid, Vec<u8>>>,
    }

    impl FakePinata {
        async fn pin_count(&self) -> usize {
            self.pins.read().await.len()
        }
    }

    #[async_trait]
    impl PinataApi for FakePinata {
        async fn pin_json(&self, name: &str, content: Value) -> Result<PinResponse> {
            let bytes = serde_json::to_vec(&content)?;
            let cid = Cid::v0_of(&bytes);
            let pinned_at = Utc::now() + Duration::milliseconds(self.pins.read().await.len() as i64);
            self.content.write().await.insert(cid.clone(), bytes.clone());
            self.pins.write().await.insert(
                cid.clone(),
                PinnedItem {
                    cid: cid.clone(),
                    name: Some(name.to_string()),
                    date_pinned: Some(pinned_at),
                },
            );
            Ok(PinResponse {
                ipfs_hash: cid.to_string(),
                pin_size: bytes.len() as u64,
                timestamp: None,
            })
        }

        async fn unpin(&self, cid: &Cid) -> Result<bool> {
            Ok(self.pins.write().await.remove(cid).is_some())
        }

        async fn fetch(&self, cid: &Cid) -> Result<Vec<u8>> {
            self.content
                .read()
                .await
                .get(cid)
                .cloned()
                .ok_or_else(|| Error::NotFound(cid.to_string()))
        }

        async fn find_by_name(&self, name: &str) -> Result<Option<Cid>> {
            Ok(self
                .pins
                .read()
                .await
                .values()
                .filter(|p| p.name.as_deref() == Some(name))
                .max_by_key(|p| p.date_pinned)
                .map(|p| p.cid.clone()))
        }

        async fn list_pins(&self, limit: usize, offset: usize) -> Result<Vec<PinnedItem>> {
            // Newest first, like the service.
            let mut pins: Vec<PinnedItem> = self.pins.read().await.values().cloned().collect();
            pins.sort_by(|a, b| b.date_pinned.cmp(&a.date_pinned));
            Ok(paginate(pins, Some(limit), Some(offset)))
        }

        async fn test_authentication(&self) -> Result<String> {
            Ok("Congratulations! You are communicating with the Pinata API!".to_string())
        }
    }

    async fn adapter() -> (Arc<FakePinata>, PinataAdapter) {
        let service = Arc::new(FakePinata::default());
        let adapter = PinataAdapter::with_client(service.clone());
        adapter.initialize().await.unwrap();
        (service, adapter)
    }

    #[tokio::test]
    async fn test_pinata_store_retrieve() {
        let (_, adapter) = adapter().await;
        let payload = b"sealed".to_vec();

        let result = adapter
            .store(payload.clone(), sample_metadata("doc-1", &payload))
            .await
            .unwrap();
        assert!(result.reference.starts_with("ipfs://Qm"));

        let by_id = adapter.retrieve("doc-1").await.unwrap();
        assert_eq!(by_id.encrypted_payload, payload);
        assert_eq!(by_id.metadata, result.metadata);
        let by_reference = adapter.retrieve(&result.reference).await.unwrap();
        assert_eq!(by_reference.metadata.id, "doc-1");
    }

    #[tokio::test]
    async fn test_pinata_resolves_by_pin_name() {
        let (service, first) = adapter().await;
        first
            .store(vec![7; 3], sample_metadata("shared", &[7; 3]))
            .await
            .unwrap();

        // A fresh adapter has an empty index but the same account.
        let second = PinataAdapter::with_client(service.clone());
        second.initialize().await.unwrap();

        assert!(second.exists("shared").await.unwrap());
        assert_eq!(
            second.retrieve("shared").await.unwrap().encrypted_payload,
            vec![7; 3]
        );
        assert!(second.delete("shared").await.unwrap());
        assert_eq!(service.pin_count().await, 0);
    }

    #[tokio::test]
    async fn test_pinata_absence() {
        let (_, adapter) = adapter().await;

        assert!(matches!(
            adapter.retrieve("missing").await,
            Err(Error::NotFound(_))
        ));
        assert!(!adapter.exists("missing").await.unwrap());
        assert!(!adapter.delete("missing").await.unwrap());
        assert!(!adapter.delete("ipfs://garbage").await.unwrap());
        assert!(matches!(
            adapter.retrieve("memory://x#doc").await,
            Err(Error::InvalidReference(_))
        ));
    }

    #[tokio::test]
    async fn test_pinata_list_oldest_first() {
        let (_, adapter) = adapter().await;
        for id in ["b", "a", "c"] {
            adapter
                .store(vec![1], sample_metadata(id, &[1]))
                .await
                .unwrap();
        }

        assert_eq!(adapter.list(None, None).await.unwrap(), vec!["b", "a", "c"]);
        assert_eq!(adapter.list(Some(1), Some(1)).await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_pinata_overwrite_unpins_previous() {
        let (service, adapter) = adapter().await;
        adapter
            .store(vec![1; 2], sample_metadata("doc", &[1; 2]))
            .await
            .unwrap();
        adapter
            .store(vec![2; 5], sample_metadata("doc", &[2; 5]))
            .await
            .unwrap();

        assert_eq!(service.pin_count().await, 1);
        assert_eq!(adapter.list(None, None).await.unwrap(), vec!["doc"]);
        assert_eq!(adapter.retrieve("doc").await.unwrap().metadata.size, 5);
    }
}
