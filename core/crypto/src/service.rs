//! Encryption service boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::condition::{AuthContext, ChainHandle, Condition, Domain};
use crate::kit::MessageKit;
use tacostore_common::Result;

/// Settings that select the key-holder cohort a service encrypts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Network domain.
    pub domain: Domain,
    /// Ritual id of the cohort.
    pub ritual_id: u32,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            domain: Domain::Lynx,
            ritual_id: 27,
        }
    }
}

/// Output of [`EncryptionService::encrypt`].
#[derive(Debug, Clone)]
pub struct Encrypted {
    /// Ciphertext envelope.
    pub kit: MessageKit,
    /// Condition the kit was sealed under.
    pub condition: Condition,
}

/// Encryption primitive the storage orchestrator delegates to.
///
/// Implementations own key material and condition evaluation. The
/// orchestrator only moves kits and conditions around.
#[async_trait]
pub trait EncryptionService: Send + Sync {
    /// Domain the service operates in.
    fn domain(&self) -> Domain;

    /// Chain conditions are created for.
    fn chain(&self) -> &ChainHandle;

    /// Connect to the key holders. Must succeed before encrypt/decrypt.
    async fn initialize(&self) -> Result<()>;

    /// Encrypt `plaintext` under `condition` on behalf of `auth`.
    ///
    /// # Errors
    /// - `Encryption` on any failure
    async fn encrypt(
        &self,
        plaintext: &[u8],
        condition: &Condition,
        auth: &AuthContext,
    ) -> Result<Encrypted>;

    /// Decrypt a kit on behalf of `auth`.
    ///
    /// # Errors
    /// - `Decryption` when the condition is not met or the kit is invalid
    async fn decrypt(&self, kit: &MessageKit, auth: &AuthContext) -> Result<Vec<u8>>;

    /// Condition that expires at `expiry`.
    ///
    /// # Errors
    /// - `InvalidConfig` if `expiry` is not in the future
    fn create_time_condition(&self, expiry: DateTime<Utc>) -> Result<Condition> {
        Condition::time(self.chain().chain_id, expiry, Utc::now())
    }

    /// Condition requiring a token of `contract_address`.
    ///
    /// # Errors
    /// - `InvalidConfig` if the address is malformed
    fn create_ownership_condition(
        &self,
        contract_address: &str,
        token_id: Option<&str>,
    ) -> Result<Condition> {
        Condition::ownership(self.chain().chain_id, contract_address, token_id)
    }
}
