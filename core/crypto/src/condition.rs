//! Access conditions and the caller context they are checked against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use tacostore_common::{Error, Result};

/// Network domain the encryption service operates in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Development network.
    #[default]
    Lynx,
    /// Testnet.
    Tapir,
    /// Production network.
    Mainnet,
}

impl Domain {
    /// Lowercase name used in configs and key derivation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lynx => "lynx",
            Self::Tapir => "tapir",
            Self::Mainnet => "mainnet",
        }
    }

    /// Chain the domain's conditions are evaluated on unless overridden.
    pub fn default_chain_id(&self) -> u64 {
        match self {
            Self::Lynx | Self::Tapir => 80002,
            Self::Mainnet => 137,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lynx" | "devnet" => Ok(Self::Lynx),
            "tapir" | "testnet" => Ok(Self::Tapir),
            "mainnet" => Ok(Self::Mainnet),
            other => Err(Error::InvalidConfig(format!("Unknown domain: {}", other))),
        }
    }
}

/// Handle to the chain conditions are evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHandle {
    /// EVM chain id.
    pub chain_id: u64,
    /// RPC endpoint, when the service talks to the chain itself.
    #[serde(default)]
    pub rpc_url: Option<String>,
}

impl ChainHandle {
    /// Default chain for a domain, without an RPC endpoint.
    pub fn for_domain(domain: Domain) -> Self {
        Self {
            chain_id: domain.default_chain_id(),
            rpc_url: None,
        }
    }
}

/// Access-control predicate attached to a message kit.
///
/// The storage layer carries this as opaque JSON; only the encryption
/// service interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "conditionType",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Condition {
    /// Decryptable until `expires_at`.
    Time {
        chain: u64,
        expires_at: DateTime<Utc>,
    },
    /// Decryptable by holders of a token of `contract_address`.
    Ownership {
        chain: u64,
        contract_address: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token_id: Option<String>,
    },
    /// Externally defined condition, passed through untouched.
    Custom { definition: serde_json::Value },
}

impl Condition {
    /// Build a time condition expiring at `expires_at`.
    ///
    /// # Errors
    /// - `InvalidConfig` if `expires_at` is not after `now`
    pub fn time(chain: u64, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<Self> {
        if expires_at <= now {
            return Err(Error::InvalidConfig(format!(
                "Expiry {} is not in the future",
                expires_at.to_rfc3339()
            )));
        }
        Ok(Self::Time { chain, expires_at })
    }

    /// Build a token ownership condition.
    ///
    /// # Errors
    /// - `InvalidConfig` if the address is not `0x` followed by 40 hex digits
    /// - `InvalidConfig` if `token_id` is present but empty
    pub fn ownership(chain: u64, contract_address: &str, token_id: Option<&str>) -> Result<Self> {
        if !is_valid_address(contract_address) {
            return Err(Error::InvalidConfig(format!(
                "Invalid contract address: {}",
                contract_address
            )));
        }
        if matches!(token_id, Some(t) if t.trim().is_empty()) {
            return Err(Error::InvalidConfig("Token id cannot be empty".to_string()));
        }
        Ok(Self::Ownership {
            chain,
            contract_address: contract_address.to_ascii_lowercase(),
            token_id: token_id.map(str::to_string),
        })
    }

    /// Convert to the opaque JSON form stored in metadata.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse from the opaque JSON form stored in metadata.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Check the condition for a caller at time `now`.
    ///
    /// # Errors
    /// - `Decryption` when the condition is not satisfied
    pub fn evaluate(&self, auth: &AuthContext, now: DateTime<Utc>) -> Result<()> {
        match self {
            Self::Time { expires_at, .. } => {
                if now < *expires_at {
                    Ok(())
                } else {
                    Err(Error::decryption(format!(
                        "Access condition not satisfied: expired at {}",
                        expires_at.to_rfc3339()
                    )))
                }
            }
            Self::Ownership {
                contract_address,
                token_id,
                ..
            } => {
                if auth.holds(contract_address, token_id.as_deref()) {
                    Ok(())
                } else {
                    Err(Error::decryption(format!(
                        "Access condition not satisfied: caller does not hold {}",
                        contract_address
                    )))
                }
            }
            Self::Custom { .. } => Err(Error::decryption(
                "Access condition not satisfied: custom conditions need an external evaluator",
            )),
        }
    }
}

/// Whether `address` looks like an EVM address.
pub fn is_valid_address(address: &str) -> bool {
    match address.strip_prefix("0x").or_else(|| address.strip_prefix("0X")) {
        Some(hex) => hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// A token the caller holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHolding {
    pub contract_address: String,
    #[serde(default)]
    pub token_id: Option<String>,
}

/// Authenticated caller on whose behalf data is encrypted or decrypted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Wallet address of the caller.
    #[serde(default)]
    pub address: Option<String>,
    /// Tokens the caller has proven to hold.
    #[serde(default)]
    pub holdings: Vec<TokenHolding>,
}

impl AuthContext {
    /// Caller without an address or holdings.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Caller identified by a wallet address.
    pub fn for_address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            holdings: Vec::new(),
        }
    }

    /// Add a token holding.
    pub fn with_holding(mut self, contract_address: &str, token_id: Option<&str>) -> Self {
        self.holdings.push(TokenHolding {
            contract_address: contract_address.to_ascii_lowercase(),
            token_id: token_id.map(str::to_string),
        });
        self
    }

    /// Whether the caller holds a token of `contract_address`.
    ///
    /// Without `token_id` any token of the contract qualifies.
    pub fn holds(&self, contract_address: &str, token_id: Option<&str>) -> bool {
        self.holdings.iter().any(|h| {
            h.contract_address.eq_ignore_ascii_case(contract_address)
                && match token_id {
                    Some(wanted) => h.token_id.as_deref() == Some(wanted),
                    None => true,
                }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const CONTRACT: &str = "0x1234567890AbCdEf1234567890abcdef12345678";

    #[test]
    fn test_time_condition_requires_future_expiry() {
        let now = Utc::now();
        assert!(Condition::time(80002, now + Duration::hours(1), now).is_ok());
        assert!(matches!(
            Condition::time(80002, now - Duration::seconds(1), now),
            Err(Error::InvalidConfig(_))
        ));
        assert!(Condition::time(80002, now, now).is_err());
    }

    #[test]
    fn test_time_condition_evaluation() {
        let now = Utc::now();
        let condition = Condition::time(80002, now + Duration::hours(1), now).unwrap();
        let auth = AuthContext::anonymous();

        assert!(condition.evaluate(&auth, now).is_ok());
        assert!(matches!(
            condition.evaluate(&auth, now + Duration::hours(2)),
            Err(Error::Decryption { .. })
        ));
    }

    #[test]
    fn test_ownership_address_validation() {
        assert!(Condition::ownership(137, CONTRACT, None).is_ok());
        assert!(Condition::ownership(137, "0x1234", None).is_err());
        assert!(Condition::ownership(137, "1234567890abcdef1234567890abcdef12345678", None).is_err());
        assert!(Condition::ownership(137, "0xZZ34567890abcdef1234567890abcdef12345678", None).is_err());
        assert!(Condition::ownership(137, CONTRACT, Some("")).is_err());
    }

    #[test]
    fn test_ownership_evaluation() {
        let condition = Condition::ownership(137, CONTRACT, Some("7")).unwrap();
        let now = Utc::now();

        let holder = AuthContext::for_address("0xabc").with_holding(CONTRACT, Some("7"));
        assert!(condition.evaluate(&holder, now).is_ok());

        let wrong_token = AuthContext::for_address("0xabc").with_holding(CONTRACT, Some("8"));
        assert!(condition.evaluate(&wrong_token, now).is_err());

        let any_token = Condition::ownership(137, CONTRACT, None).unwrap();
        assert!(any_token.evaluate(&wrong_token, now).is_ok());
        assert!(any_token.evaluate(&AuthContext::anonymous(), now).is_err());
    }

    #[test]
    fn test_condition_json_shape() {
        let now = Utc::now();
        let condition = Condition::time(80002, now + Duration::hours(1), now).unwrap();
        let value = condition.to_value().unwrap();

        assert_eq!(value["conditionType"], "time");
        assert_eq!(value["chain"], 80002);
        assert!(value["expiresAt"].is_string());
        assert_eq!(Condition::from_value(value).unwrap(), condition);
    }

    #[test]
    fn test_domain_parsing() {
        assert_eq!("lynx".parse::<Domain>().unwrap(), Domain::Lynx);
        assert_eq!("TESTNET".parse::<Domain>().unwrap(), Domain::Tapir);
        assert!("moonnet".parse::<Domain>().is_err());
        assert_eq!(Domain::Mainnet.to_string(), "mainnet");
    }
}
