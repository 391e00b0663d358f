//! Store/retrieve orchestration over an adapter and an encryption service.

use chrono::{DateTime, SubsecRound, Utc};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use tacostore_common::{Error, ObjectId, Result};
use tacostore_crypto::{AuthContext, Condition, EncryptionService, LocalEncryptionService, MessageKit};
use tacostore_storage::metadata::DEFAULT_CONTENT_TYPE;
use tacostore_storage::{
    AdapterRegistry, EncryptionMetadata, HealthStatus, IpfsAdapter, IpfsConfig, MemoryAdapter,
    PinataAdapter, PinataConfig, SqliteAdapter, SqliteConfig, StorageAdapter, StorageMetadata,
    StorageResult,
};

/// Per-call options for [`TacoStorage::store`].
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Logical id; a random UUID when absent.
    pub id: Option<String>,
    /// MIME type; `application/octet-stream` when absent.
    pub content_type: Option<String>,
    /// Copied verbatim into the metadata.
    pub custom_metadata: Option<Map<String, Value>>,
    /// Access condition; a time condition when absent.
    pub condition: Option<Condition>,
    /// Expiry of the default time condition; ignored when `condition` is set.
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoreOptions {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_custom_metadata(mut self, custom: Map<String, Value>) -> Self {
        self.custom_metadata = Some(custom);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// Decrypted data with the metadata it was stored under.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub data: Vec<u8>,
    pub metadata: StorageMetadata,
}

/// Encrypted object storage.
///
/// Encrypts plaintext under an access condition, hands the ciphertext and
/// its metadata to a storage adapter, and reverses the pipeline on
/// retrieval. Holds no state between calls beyond its collaborators and
/// configuration; share it through `Arc`.
pub struct TacoStorage {
    adapter: Arc<dyn StorageAdapter>,
    encryption: Arc<dyn EncryptionService>,
    config: StorageConfig,
}

impl TacoStorage {
    /// Create an orchestrator over explicit collaborators.
    pub fn new(
        adapter: Arc<dyn StorageAdapter>,
        encryption: Arc<dyn EncryptionService>,
        config: StorageConfig,
    ) -> Self {
        Self {
            adapter,
            encryption,
            config,
        }
    }

    /// In-memory storage with an ephemeral local encryption key.
    ///
    /// Nothing survives the process.
    pub fn in_memory(config: StorageConfig) -> Self {
        let encryption = LocalEncryptionService::ephemeral(config.encryption_config());
        Self::new(
            Arc::new(MemoryAdapter::new()),
            Arc::new(encryption),
            config,
        )
    }

    /// SQLite storage at `path`.
    pub fn with_sqlite(
        path: impl Into<PathBuf>,
        encryption: Arc<dyn EncryptionService>,
        config: StorageConfig,
    ) -> Self {
        let adapter = SqliteAdapter::new(SqliteConfig::new(path));
        Self::new(Arc::new(adapter), encryption, config)
    }

    /// Storage on an IPFS node.
    ///
    /// # Errors
    /// - `InvalidConfig` if the node URL is malformed
    pub fn with_ipfs(
        ipfs: IpfsConfig,
        encryption: Arc<dyn EncryptionService>,
        config: StorageConfig,
    ) -> Result<Self> {
        let adapter = IpfsAdapter::new(ipfs)?;
        Ok(Self::new(Arc::new(adapter), encryption, config))
    }

    /// Storage on the Pinata pinning service.
    ///
    /// # Errors
    /// - `InvalidConfig` for a blank JWT or malformed URLs
    pub fn with_pinata(
        pinata: PinataConfig,
        encryption: Arc<dyn EncryptionService>,
        config: StorageConfig,
    ) -> Result<Self> {
        let adapter = PinataAdapter::new(pinata)?;
        Ok(Self::new(Arc::new(adapter), encryption, config))
    }

    /// Storage built from `config.adapter` through `registry`.
    ///
    /// # Errors
    /// - `InvalidConfig` if the configuration is invalid or names an
    ///   unknown adapter
    pub fn from_config(
        config: StorageConfig,
        encryption: Arc<dyn EncryptionService>,
        registry: &AdapterRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let adapter = registry.resolve(&config.adapter.kind, config.adapter.options.clone())?;
        Ok(Self::new(adapter, encryption, config))
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        &self.adapter
    }

    /// Initialize the encryption service, then the adapter.
    ///
    /// # Errors
    /// - Whatever either collaborator reports, unchanged
    pub async fn initialize(&self) -> Result<()> {
        self.encryption.initialize().await?;
        self.adapter.initialize().await?;
        info!(
            adapter = self.adapter.name(),
            domain = %self.config.domain,
            "TACo storage initialized"
        );
        Ok(())
    }

    /// Encrypt and persist `data`.
    ///
    /// # Errors
    /// - `InvalidConfig` for empty data, a blank id or a past expiry
    /// - `Encryption` if encryption fails
    /// - `Storage` for backend failures, with the cause chained
    pub async fn store(
        &self,
        data: &[u8],
        auth: &AuthContext,
        options: StoreOptions,
    ) -> Result<StorageResult> {
        if data.is_empty() {
            return Err(Error::InvalidConfig("Data cannot be empty".to_string()));
        }
        let id = match options.id {
            Some(id) => ObjectId::new(id)?,
            None => ObjectId::generate(),
        };

        let condition = match options.condition {
            Some(condition) => condition,
            None => {
                let expires_at = match options.expires_at {
                    Some(expires_at) => expires_at,
                    None => self.default_expiry()?,
                };
                self.encryption.create_time_condition(expires_at)?
            }
        };

        debug!(id = %id, size = data.len(), "Encrypting data");
        let encrypted = self
            .encryption
            .encrypt(data, &condition, auth)
            .await
            .map_err(|e| e.into_encryption("Failed to encrypt data"))?;
        let kit_bytes = encrypted
            .kit
            .to_bytes()
            .map_err(|e| e.into_encryption("Failed to encode message kit"))?;
        let conditions = encrypted
            .condition
            .to_value()
            .map_err(|e| e.into_encryption("Failed to encode condition"))?;

        let metadata = StorageMetadata {
            id: id.into_inner(),
            content_type: options
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            size: kit_bytes.len() as u64,
            // Millisecond precision survives every backend's timestamp format.
            created_at: Utc::now().trunc_subsecs(3),
            custom_metadata: options.custom_metadata,
            encryption_metadata: EncryptionMetadata {
                message_kit: kit_bytes.clone(),
                conditions,
            },
            backend_hash: None,
        };

        let result = self
            .adapter
            .store(kit_bytes, metadata)
            .await
            .map_err(|e| e.into_storage("Failed to store data"))?;

        info!(
            id = %result.id,
            adapter = self.adapter.name(),
            size = result.metadata.size,
            "Stored encrypted data"
        );
        Ok(result)
    }

    /// Fetch and decrypt an object.
    ///
    /// # Errors
    /// - `InvalidConfig` for a blank id
    /// - `NotFound` if the adapter has no such object
    /// - `Decryption` if `auth` does not satisfy the condition
    /// - `Retrieval` for backend or format failures, with the cause chained
    pub async fn retrieve(&self, id: &str, auth: &AuthContext) -> Result<RetrievalResult> {
        validate_id(id)?;

        let object = self
            .adapter
            .retrieve(id)
            .await
            .map_err(|e| e.into_retrieval("Failed to retrieve data"))?;
        let kit = MessageKit::from_bytes(&object.encrypted_payload)
            .map_err(|e| e.into_retrieval("Failed to retrieve data"))?;
        let data = self
            .encryption
            .decrypt(&kit, auth)
            .await
            .map_err(|e| e.into_decryption("Failed to decrypt data"))?;

        debug!(id = %id, size = data.len(), "Retrieved and decrypted data");
        Ok(RetrievalResult {
            data,
            metadata: object.metadata,
        })
    }

    /// Remove an object. Returns `false` if nothing matched.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        validate_id(id)?;
        let deleted = self
            .adapter
            .delete(id)
            .await
            .map_err(|e| e.into_storage("Failed to delete data"))?;
        debug!(id = %id, deleted, "Delete requested");
        Ok(deleted)
    }

    /// Whether an object exists, best effort.
    pub async fn exists(&self, id: &str) -> Result<bool> {
        validate_id(id)?;
        self.adapter
            .exists(id)
            .await
            .map_err(|e| e.into_retrieval("Failed to check existence"))
    }

    /// Metadata of an object, without decrypting it.
    pub async fn get_metadata(&self, id: &str) -> Result<StorageMetadata> {
        validate_id(id)?;
        let object = self
            .adapter
            .retrieve(id)
            .await
            .map_err(|e| e.into_retrieval("Failed to retrieve metadata"))?;
        Ok(object.metadata)
    }

    /// Stored ids, oldest first.
    ///
    /// # Errors
    /// - `Adapter` if the adapter cannot enumerate its objects
    pub async fn list(&self, limit: Option<usize>, offset: Option<usize>) -> Result<Vec<String>> {
        if !self.adapter.supports_list() {
            return Err(Error::Adapter(format!(
                "{} adapter does not support listing",
                self.adapter.name()
            )));
        }
        self.adapter
            .list(limit, offset)
            .await
            .map_err(|e| e.into_retrieval("Failed to list data"))
    }

    /// Adapter health with orchestrator details. Never fails.
    pub async fn health(&self) -> HealthStatus {
        let status = match self.adapter.health().await {
            Ok(status) => status,
            Err(e) => {
                warn!(adapter = self.adapter.name(), error = %e, "Health check failed");
                HealthStatus::unhealthy(e)
            }
        };
        status
            .with_detail("adapter", self.adapter.name())
            .with_detail("domain", self.config.domain.as_str())
    }

    /// Release adapter resources.
    pub async fn cleanup(&self) -> Result<()> {
        self.adapter
            .cleanup()
            .await
            .map_err(|e| e.into_storage("Failed to clean up adapter"))?;
        debug!(adapter = self.adapter.name(), "TACo storage cleaned up");
        Ok(())
    }

    fn default_expiry(&self) -> Result<DateTime<Utc>> {
        self.config
            .default_expiry()
            .and_then(|expiry| Utc::now().checked_add_signed(expiry))
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "Default expiry of {} seconds is out of range",
                    self.config.default_expiry_secs
                ))
            })
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::InvalidConfig("Id cannot be empty".to_string()));
    }
    Ok(())
}
