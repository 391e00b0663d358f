//! Single-key encryption service for development and tests.
//!
//! Seals kits with XChaCha20-Poly1305 under keys derived from one master key
//! and evaluates time and ownership conditions locally. It honors the same
//! boundary as a threshold service but gives none of its trust guarantees.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};
use uuid::Uuid;

use crate::aead::{open, seal};
use crate::condition::{AuthContext, ChainHandle, Condition, Domain};
use crate::kdf::{derive_key, KdfParams};
use crate::keys::{MasterKey, Salt};
use crate::kit::{MessageKit, KIT_VERSION};
use crate::service::{Encrypted, EncryptionConfig, EncryptionService};
use tacostore_common::{Error, Result};

/// Local encryption service.
pub struct LocalEncryptionService {
    config: EncryptionConfig,
    chain: ChainHandle,
    master_key: MasterKey,
    initialized: AtomicBool,
}

impl LocalEncryptionService {
    /// Create a service around an existing master key.
    pub fn new(config: EncryptionConfig, chain: ChainHandle, master_key: MasterKey) -> Self {
        Self {
            config,
            chain,
            master_key,
            initialized: AtomicBool::new(false),
        }
    }

    /// Create a service with a fresh random key.
    ///
    /// Data encrypted by it cannot be decrypted after the service is dropped.
    pub fn ephemeral(config: EncryptionConfig) -> Self {
        let chain = ChainHandle::for_domain(config.domain);
        Self::new(config, chain, MasterKey::generate())
    }

    /// Create a service whose key is derived from a passphrase.
    ///
    /// The salt is bound to the domain, so the same passphrase reopens the
    /// same data within one domain only.
    ///
    /// # Errors
    /// - `InvalidConfig` if the passphrase is empty or `params` are invalid
    pub fn from_passphrase(
        config: EncryptionConfig,
        chain: ChainHandle,
        passphrase: &[u8],
        params: &KdfParams,
    ) -> Result<Self> {
        let salt = Salt::for_domain(config.domain.as_str());
        let master_key = derive_key(passphrase, &salt, params)?;
        Ok(Self::new(config, chain, master_key))
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}

#[async_trait]
impl EncryptionService for LocalEncryptionService {
    fn domain(&self) -> Domain {
        self.config.domain
    }

    fn chain(&self) -> &ChainHandle {
        &self.chain
    }

    async fn initialize(&self) -> Result<()> {
        if !self.initialized.swap(true, Ordering::AcqRel) {
            info!(
                domain = %self.config.domain,
                ritual_id = self.config.ritual_id,
                chain_id = self.chain.chain_id,
                "Local encryption service initialized"
            );
        }
        Ok(())
    }

    async fn encrypt(
        &self,
        plaintext: &[u8],
        condition: &Condition,
        _auth: &AuthContext,
    ) -> Result<Encrypted> {
        if !self.is_initialized() {
            return Err(Error::encryption("Encryption service is not initialized"));
        }

        let kit_id = Uuid::new_v4().as_bytes().to_vec();
        let aad = MessageKit::header_bytes(
            KIT_VERSION,
            &kit_id,
            self.config.domain,
            self.config.ritual_id,
            condition,
        )
        .map_err(|e| e.into_encryption("Failed to encode kit header"))?;

        let key = self
            .master_key
            .derive_object_key(&kit_id, self.config.domain.as_str());
        let ciphertext = seal(key.as_bytes(), plaintext, &aad)?;

        debug!(size = plaintext.len(), "Sealed message kit");

        Ok(Encrypted {
            kit: MessageKit {
                version: KIT_VERSION,
                kit_id,
                domain: self.config.domain,
                ritual_id: self.config.ritual_id,
                condition: condition.clone(),
                ciphertext,
            },
            condition: condition.clone(),
        })
    }

    async fn decrypt(&self, kit: &MessageKit, auth: &AuthContext) -> Result<Vec<u8>> {
        if !self.is_initialized() {
            return Err(Error::decryption("Encryption service is not initialized"));
        }
        if kit.domain != self.config.domain {
            return Err(Error::decryption(format!(
                "Message kit belongs to domain {}, service runs on {}",
                kit.domain, self.config.domain
            )));
        }
        if kit.ritual_id != self.config.ritual_id {
            return Err(Error::decryption(format!(
                "Message kit belongs to ritual {}, service uses {}",
                kit.ritual_id, self.config.ritual_id
            )));
        }

        kit.condition.evaluate(auth, Utc::now())?;

        let aad = kit
            .associated_data()
            .map_err(|e| e.into_decryption("Failed to encode kit header"))?;
        let key = self
            .master_key
            .derive_object_key(&kit.kit_id, self.config.domain.as_str());

        let plaintext = open(key.as_bytes(), &kit.ciphertext, &aad)?;
        debug!(size = plaintext.len(), "Opened message kit");
        Ok(plaintext)
    }
}
