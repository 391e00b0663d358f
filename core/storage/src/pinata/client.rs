//! Pinata HTTP API client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::reference::Cid;
use tacostore_common::{Error, Result};

const DEFAULT_API_URL: &str = "https://api.pinata.cloud";
const DEFAULT_GATEWAY_URL: &str = "https://gateway.pinata.cloud";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Result of pinning content.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PinResponse {
    #[serde(rename = "IpfsHash")]
    pub ipfs_hash: String,
    #[serde(rename = "PinSize", default)]
    pub pin_size: u64,
    #[serde(rename = "Timestamp", default)]
    pub timestamp: Option<String>,
}

/// One pinned item as reported by the pin list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedItem {
    pub cid: Cid,
    /// Metadata name given at pin time.
    pub name: Option<String>,
    pub date_pinned: Option<DateTime<Utc>>,
}

/// Operations the Pinata adapter needs from the service.
#[async_trait]
pub trait PinataApi: Send + Sync {
    /// Pin a JSON document under metadata `name`.
    async fn pin_json(&self, name: &str, content: Value) -> Result<PinResponse>;

    /// Unpin `cid`. Returns `false` if it was not pinned.
    async fn unpin(&self, cid: &Cid) -> Result<bool>;

    /// Fetch content through the gateway.
    ///
    /// # Errors
    /// - `NotFound` if the gateway has no such content
    async fn fetch(&self, cid: &Cid) -> Result<Vec<u8>>;

    /// Most recent pinned CID whose metadata name is `name`.
    async fn find_by_name(&self, name: &str) -> Result<Option<Cid>>;

    /// One page of currently pinned items.
    async fn list_pins(&self, limit: usize, offset: usize) -> Result<Vec<PinnedItem>>;

    /// Check the credentials; returns the service's message.
    async fn test_authentication(&self) -> Result<String>;
}

/// Pinata adapter configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinataConfig {
    /// API JWT.
    pub jwt: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl PinataConfig {
    /// Configuration with default endpoints.
    pub fn new(jwt: impl Into<String>) -> Self {
        Self {
            jwt: jwt.into(),
            api_url: default_api_url(),
            gateway_url: default_gateway_url(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for PinataConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinataConfig")
            .field("jwt", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .field("gateway_url", &self.gateway_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct PinListResponse {
    #[serde(default)]
    rows: Vec<PinRow>,
}

#[derive(Debug, Deserialize)]
struct PinRow {
    ipfs_pin_hash: String,
    #[serde(default)]
    date_pinned: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: Option<PinRowMetadata>,
}

#[derive(Debug, Deserialize)]
struct PinRowMetadata {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    message: String,
}

/// Pinata REST client authenticated with a JWT.
pub struct HttpPinataClient {
    http: Client,
    api_url: Url,
    gateway_url: Url,
    auth: String,
}

impl HttpPinataClient {
    /// Create a client from `config`.
    ///
    /// # Errors
    /// - `InvalidConfig` for a blank JWT or a malformed URL
    /// - `Adapter` if the HTTP client cannot be built
    pub fn new(config: &PinataConfig) -> Result<Self> {
        if config.jwt.trim().is_empty() {
            return Err(Error::InvalidConfig("Pinata JWT cannot be empty".to_string()));
        }
        let parse = |name: &str, value: &str| {
            Url::parse(value)
                .map_err(|e| Error::InvalidConfig(format!("Invalid Pinata {} {}: {}", name, value, e)))
        };
        let api_url = parse("API URL", &config.api_url)?;
        let gateway_url = parse("gateway URL", &config.gateway_url)?;

        let http = Client::builder()
            .user_agent("tacostore/0.1")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Adapter(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_url,
            gateway_url,
            auth: format!("Bearer {}", config.jwt),
        })
    }

    fn api(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path)
            .map_err(|e| Error::Adapter(format!("Invalid Pinata API URL: {}", e)))
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| Error::Network(format!("Failed to parse Pinata response: {}", e)))
        } else {
            Err(Self::failure(response).await)
        }
    }

    async fn failure(response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Error::NotFound(format!("Pinata: {}", body)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Error::Adapter(format!("Pinata rejected the credentials: {}", body))
            }
            _ => Error::Network(format!("Pinata API error: {} - {}", status, body)),
        }
    }

    async fn pin_list(&self, query: &[(&str, String)]) -> Result<Vec<PinnedItem>> {
        let response = self
            .http
            .get(self.api("data/pinList")?)
            .header(header::AUTHORIZATION, &self.auth)
            .query(&[("status", "pinned")])
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to list pins: {}", e)))?;

        let list: PinListResponse = self.handle_response(response).await?;
        Ok(list
            .rows
            .into_iter()
            .filter_map(|row| {
                Some(PinnedItem {
                    cid: Cid::parse(&row.ipfs_pin_hash).ok()?,
                    name: row.metadata.and_then(|m| m.name),
                    date_pinned: row.date_pinned,
                })
            })
            .collect())
    }
}

#[async_trait]
impl PinataApi for HttpPinataClient {
    async fn pin_json(&self, name: &str, content: Value) -> Result<PinResponse> {
        let body = json!({
            "pinataContent": content,
            "pinataMetadata": { "name": name },
            "pinataOptions": { "cidVersion": 0 },
        });

        let response = self
            .http
            .post(self.api("pinning/pinJSONToIPFS")?)
            .header(header::AUTHORIZATION, &self.auth)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to pin JSON: {}", e)))?;

        self.handle_response(response).await
    }

    async fn unpin(&self, cid: &Cid) -> Result<bool> {
        let response = self
            .http
            .delete(self.api(&format!("pinning/unpin/{}", cid))?)
            .header(header::AUTHORIZATION, &self.auth)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to unpin: {}", e)))?;

        if response.status().is_success() {
            return Ok(true);
        }
        match Self::failure(response).await {
            Error::NotFound(_) => Ok(false),
            Error::Network(message) if message.contains("NOT_PINNED") => Ok(false),
            other => Err(other),
        }
    }

    async fn fetch(&self, cid: &Cid) -> Result<Vec<u8>> {
        let url = self
            .gateway_url
            .join(&format!("ipfs/{}", cid))
            .map_err(|e| Error::Adapter(format!("Invalid Pinata gateway URL: {}", e)))?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to fetch from gateway: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Failed to read gateway response: {}", e)))?;
        Ok(bytes.to_vec())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Cid>> {
        let items = self
            .pin_list(&[
                ("metadata[name]", name.to_string()),
                ("pageLimit", "1".to_string()),
            ])
            .await?;
        Ok(items
            .into_iter()
            .find(|item| item.name.as_deref() == Some(name))
            .map(|item| item.cid))
    }

    async fn list_pins(&self, limit: usize, offset: usize) -> Result<Vec<PinnedItem>> {
        self.pin_list(&[
            ("pageLimit", limit.to_string()),
            ("pageOffset", offset.to_string()),
        ])
        .await
    }

    async fn test_authentication(&self) -> Result<String> {
        let response = self
            .http
            .get(self.api("data/testAuthentication")?)
            .header(header::AUTHORIZATION, &self.auth)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Pinata unreachable: {}", e)))?;

        let auth: AuthResponse = self.handle_response(response).await?;
        Ok(auth.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_redaction() {
        let config: PinataConfig = serde_json::from_str(r#"{"jwt": "secret-token"}"#).unwrap();
        assert_eq!(config, PinataConfig::new("secret-token"));
        assert_eq!(config.gateway_url, "https://gateway.pinata.cloud");

        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn test_blank_jwt_rejected() {
        assert!(matches!(
            HttpPinataClient::new(&PinataConfig::new("  ")),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_endpoints() {
        let client = HttpPinataClient::new(&PinataConfig::new("jwt")).unwrap();
        assert_eq!(
            client.api("pinning/pinJSONToIPFS").unwrap().as_str(),
            "https://api.pinata.cloud/pinning/pinJSONToIPFS"
        );
    }

    #[test]
    fn test_pin_list_shape() {
        let list: PinListResponse = serde_json::from_str(
            r#"{
                "count": 1,
                "rows": [{
                    "ipfs_pin_hash": "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG",
                    "date_pinned": "2024-01-01T00:00:00.000Z",
                    "metadata": {"name": "doc-1", "keyvalues": null}
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(list.rows.len(), 1);
        assert_eq!(
            list.rows[0].metadata.as_ref().unwrap().name.as_deref(),
            Some("doc-1")
        );
    }

    #[test]
    fn test_pin_response_shape() {
        let pin: PinResponse = serde_json::from_str(
            r#"{"IpfsHash": "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG", "PinSize": 42, "Timestamp": "2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(pin.pin_size, 42);
    }
}
