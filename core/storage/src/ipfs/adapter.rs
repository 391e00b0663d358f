//! IPFS storage adapter.

use async_trait::async_trait;
use serde_json::Map;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::client::{HttpIpfsClient, IpfsApi, IpfsConfig};
use crate::adapter::{HealthStatus, StorageAdapter, StoredObject};
use crate::helpers::{validate_store, CidIndex, InitState};
use crate::metadata::{StorageMetadata, StorageResult, StoredEnvelope};
use crate::reference::{Cid, IPFS_SCHEME};
use tacostore_common::{Error, Result};

/// IPFS storage adapter.
///
/// Each store adds a JSON envelope holding the payload and its metadata,
/// pinned on the node. The returned reference is `ipfs://<cid>`; the logical
/// id also resolves through an in-process id to CID index, and a bare CID is
/// accepted as-is.
///
/// Id lookups only live as long as the adapter: `cleanup` or a restart
/// forgets them while the objects stay pinned. The `ipfs://` reference is
/// the durable locator.
pub struct IpfsAdapter {
    client: Arc<dyn IpfsApi>,
    state: InitState,
    index: CidIndex,
}

impl IpfsAdapter {
    /// Create an adapter talking to the node at `config.api_url`.
    ///
    /// # Errors
    /// - `InvalidConfig` if the URL is malformed
    /// - `Adapter` if the HTTP client cannot be built
    pub fn new(config: IpfsConfig) -> Result<Self> {
        let client = HttpIpfsClient::new(&config)?;
        Ok(Self::with_client(Arc::new(client)))
    }

    /// Create an adapter over any node client.
    pub fn with_client(client: Arc<dyn IpfsApi>) -> Self {
        Self {
            client,
            state: InitState::new("ipfs"),
            index: CidIndex::new(),
        }
    }

    /// Unpin a CID no id points to anymore; failures are only logged.
    async fn release(&self, cid: &Cid) {
        if self.index.contains_cid(cid).await {
            return;
        }
        if let Err(e) = self.client.unpin(cid).await {
            warn!(cid = %cid, error = %e, "Failed to unpin replaced IPFS object");
        }
    }
}

#[async_trait]
impl StorageAdapter for IpfsAdapter {
    fn name(&self) -> &str {
        "ipfs"
    }

    fn scheme(&self) -> &str {
        IPFS_SCHEME
    }

    async fn initialize(&self) -> Result<()> {
        if self.state.is_initialized() {
            return Ok(());
        }
        let version = self
            .client
            .version()
            .await
            .map_err(|e| Error::Adapter(format!("IPFS node unavailable: {}", e)))?;
        if self.state.mark_initialized() {
            info!(version = %version, "IPFS adapter initialized");
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
        let bytes = envelope.to_bytes()?;
        let cid = self
            .client
            .add(bytes)
            .await
            .map_err(|e| e.into_storage("Failed to add to IPFS"))?;

        let mut metadata = envelope.metadata;
        metadata.backend_hash = Some(cid.to_string());

        if let Some(previous) = self.index.insert(&metadata.id, cid.clone()).await {
            if previous != cid {
                self.release(&previous).await;
            }
        }

        debug!(id = %metadata.id, cid = %cid, "Stored object on IPFS");

        Ok(StorageResult {
            id: metadata.id.clone(),
            reference: cid.to_reference(),
            metadata,
        })
    }

    async fn retrieve(&self, locator: &str) -> Result<StoredObject> {
        self.state.ensure()?;
        let cid = self
            .index
            .resolve(locator)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}", locator)))?;

        let bytes = self
            .client
            .cat(&cid)
            .await
            .map_err(|e| e.into_retrieval("Failed to fetch from IPFS"))?;
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
        let Ok(Some(cid)) = self.index.resolve(locator).await else {
            return Ok(false);
        };

        let unpinned = self
            .client
            .unpin(&cid)
            .await
            .map_err(|e| e.into_storage("Failed to unpin from IPFS"))?;
        let forgotten = self.index.remove_cid(&cid).await;

        debug!(cid = %cid, unpinned, forgotten, "Deleted object from IPFS");
        Ok(unpinned || forgotten > 0)
    }

    async fn exists(&self, locator: &str) -> Result<bool> {
        self.state.ensure()?;
        match self.index.resolve(locator).await {
            Ok(Some(cid)) => Ok(self.index.contains_cid(&cid).await),
            _ => Ok(false),
        }
    }

    async fn health(&self) -> Result<HealthStatus> {
        if !self.state.is_initialized() {
            return Ok(HealthStatus::unhealthy("ipfs adapter is not initialized"));
        }
        let status = match self.client.version().await {
            Ok(version) => HealthStatus::healthy(Map::new())
                .with_detail("version", version)
                .with_detail("indexed", self.index.len().await),
            Err(e) => HealthStatus::unhealthy(e),
        };
        Ok(status)
    }

    async fn cleanup(&self) -> Result<()> {
        if self.state.reset() {
            self.index.clear().await;
            debug!("IPFS adapter cleaned up");
        }
        Ok(())
    }
}
