//! Storage orchestrator configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tacostore_common::{Error, Result};
use tacostore_crypto::{ChainHandle, Domain, EncryptionConfig};

/// Ritual used when none is configured.
pub const DEFAULT_RITUAL_ID: u32 = 27;

/// Lifetime of the default time condition: 24 hours.
pub const DEFAULT_EXPIRY_SECS: u64 = 24 * 60 * 60;

/// Adapter kind used when none is configured.
pub const DEFAULT_ADAPTER: &str = "memory";

/// Which storage adapter to build, and its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Registered adapter kind (e.g., "memory", "sqlite", "ipfs", "pinata").
    pub kind: String,
    /// Adapter-specific options.
    #[serde(default)]
    pub options: Value,
}

impl AdapterConfig {
    pub fn new(kind: impl Into<String>, options: Value) -> Self {
        Self {
            kind: kind.into(),
            options,
        }
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ADAPTER, Value::Null)
    }
}

/// Orchestrator configuration.
///
/// Immutable once the orchestrator is built. Missing fields fall back to
/// the Lynx domain, ritual 27, a 24 hour default expiry and the memory
/// adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Network domain.
    #[serde(default)]
    pub domain: Domain,
    /// Ritual id of the key-holder cohort.
    #[serde(default = "default_ritual_id")]
    pub ritual_id: u32,
    /// Lifetime of the default time condition, in seconds.
    #[serde(default = "default_expiry_secs")]
    pub default_expiry_secs: u64,
    /// Chain override; the domain's default chain when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<ChainHandle>,
    /// Storage adapter selection.
    #[serde(default)]
    pub adapter: AdapterConfig,
}

fn default_ritual_id() -> u32 {
    DEFAULT_RITUAL_ID
}

fn default_expiry_secs() -> u64 {
    DEFAULT_EXPIRY_SECS
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(Domain::default())
    }
}

impl StorageConfig {
    /// Default configuration for `domain`.
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            ritual_id: DEFAULT_RITUAL_ID,
            default_expiry_secs: DEFAULT_EXPIRY_SECS,
            chain: None,
            adapter: AdapterConfig::default(),
        }
    }

    /// Same configuration with another adapter selection.
    pub fn with_adapter(mut self, kind: impl Into<String>, options: Value) -> Self {
        self.adapter = AdapterConfig::new(kind, options);
        self
    }

    /// Check the configuration.
    ///
    /// # Errors
    /// - `InvalidConfig` for a zero expiry, a blank adapter kind, or an
    ///   expiry beyond what a timestamp can hold
    pub fn validate(&self) -> Result<()> {
        if self.default_expiry_secs == 0 {
            return Err(Error::InvalidConfig(
                "Default expiry must be positive".to_string(),
            ));
        }
        if self.default_expiry().is_none() {
            return Err(Error::InvalidConfig(format!(
                "Default expiry of {} seconds is too large",
                self.default_expiry_secs
            )));
        }
        if self.adapter.kind.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "Adapter kind cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Lifetime of the default time condition.
    pub fn default_expiry(&self) -> Option<Duration> {
        i64::try_from(self.default_expiry_secs)
            .ok()
            .and_then(Duration::try_seconds)
    }

    /// Chain conditions are created for.
    pub fn chain(&self) -> ChainHandle {
        self.chain
            .clone()
            .unwrap_or_else(|| ChainHandle::for_domain(self.domain))
    }

    /// Settings for the encryption service.
    pub fn encryption_config(&self) -> EncryptionConfig {
        EncryptionConfig {
            domain: self.domain,
            ritual_id: self.ritual_id,
        }
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize and validate configuration from JSON.
    ///
    /// # Errors
    /// - `InvalidConfig` if the JSON is malformed or fails validation
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(format!("Invalid storage configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize and validate from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(bytes)
            .map_err(|e| Error::InvalidConfig(format!("Invalid storage configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::from_json("{}").unwrap();
        assert_eq!(config, StorageConfig::default());
        assert_eq!(config.domain, Domain::Lynx);
        assert_eq!(config.ritual_id, 27);
        assert_eq!(config.default_expiry(), Some(Duration::hours(24)));
        assert_eq!(config.adapter.kind, "memory");
        assert_eq!(config.chain().chain_id, 80002);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = StorageConfig::new(Domain::Mainnet)
            .with_adapter("sqlite", json!({"path": "/tmp/taco.db"}));

        let json = config.to_json().unwrap();
        assert!(json.contains("\"defaultExpirySecs\""));
        assert_eq!(StorageConfig::from_json(&json).unwrap(), config);

        let bytes = config.to_bytes().unwrap();
        assert_eq!(StorageConfig::from_bytes(&bytes).unwrap(), config);
        assert_eq!(config.chain().chain_id, 137);
    }

    #[test]
    fn test_chain_override() {
        let config = StorageConfig::from_json(
            r#"{"domain": "tapir", "chain": {"chain_id": 31337, "rpc_url": "http://localhost:8545"}}"#,
        )
        .unwrap();
        assert_eq!(config.chain().chain_id, 31337);
        assert_eq!(config.encryption_config().domain, Domain::Tapir);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(
            StorageConfig::from_json(r#"{"defaultExpirySecs": 0}"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            StorageConfig::from_json(r#"{"adapter": {"kind": " "}}"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            StorageConfig::from_json(r#"{"domain": "devnet"}"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            StorageConfig::from_json(&format!(r#"{{"defaultExpirySecs": {}}}"#, u64::MAX)),
            Err(Error::InvalidConfig(_))
        ));
    }
}
