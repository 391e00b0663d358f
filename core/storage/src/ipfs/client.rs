//! IPFS node HTTP RPC client.

use async_trait::async_trait;
use reqwest::{multipart, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::reference::Cid;
use tacostore_common::{Error, Result};

const DEFAULT_API_URL: &str = "http://127.0.0.1:5001";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Operations the IPFS adapter needs from a node.
#[async_trait]
pub trait IpfsApi: Send + Sync {
    /// Add and pin `data`, returning its CID.
    async fn add(&self, data: Vec<u8>) -> Result<Cid>;

    /// Fetch the bytes behind `cid`.
    ///
    /// # Errors
    /// - `NotFound` if the node reports the content as missing
    async fn cat(&self, cid: &Cid) -> Result<Vec<u8>>;

    /// Unpin `cid`. Returns `false` if it was not pinned.
    async fn unpin(&self, cid: &Cid) -> Result<bool>;

    /// Node version string.
    async fn version(&self) -> Result<String>;
}

/// IPFS adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpfsConfig {
    /// Base URL of the node's RPC API.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    #[serde(rename = "Version")]
    version: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "Message")]
    message: String,
}

/// Kubo-compatible RPC client.
pub struct HttpIpfsClient {
    http: Client,
    api_url: Url,
}

impl HttpIpfsClient {
    /// Create a client for the node at `config.api_url`.
    ///
    /// # Errors
    /// - `InvalidConfig` if `api_url` is not a URL
    /// - `Adapter` if the HTTP client cannot be built
    pub fn new(config: &IpfsConfig) -> Result<Self> {
        let api_url = Url::parse(&config.api_url).map_err(|e| {
            Error::InvalidConfig(format!("Invalid IPFS API URL {}: {}", config.api_url, e))
        })?;

        let http = Client::builder()
            .user_agent("tacostore/0.1")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Adapter(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, api_url })
    }

    fn endpoint(&self, command: &str) -> Result<Url> {
        self.api_url
            .join(&format!("api/v0/{}", command))
            .map_err(|e| Error::Adapter(format!("Invalid IPFS API URL: {}", e)))
    }

    /// Turn a non-success response into an error carrying the node's message.
    async fn failure(response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.message)
            .unwrap_or(body);

        if status == StatusCode::NOT_FOUND || message.contains("not found") {
            Error::NotFound(format!("IPFS content not found: {}", message))
        } else {
            Error::Network(format!("IPFS API error: {} - {}", status, message))
        }
    }
}

#[async_trait]
impl IpfsApi for HttpIpfsClient {
    async fn add(&self, data: Vec<u8>) -> Result<Cid> {
        let form = multipart::Form::new().part(
            "file",
            multipart::Part::bytes(data).file_name("object.json"),
        );

        let response = self
            .http
            .post(self.endpoint("add")?)
            .query(&[("pin", "true"), ("cid-version", "0")])
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to add to IPFS: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }
        let added: AddResponse = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("Failed to parse add response: {}", e)))?;
        Cid::parse(&added.hash)
    }

    async fn cat(&self, cid: &Cid) -> Result<Vec<u8>> {
        let response = self
            .http
            .post(self.endpoint("cat")?)
            .query(&[("arg", cid.as_str())])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to fetch from IPFS: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Failed to read IPFS content: {}", e)))?;
        Ok(bytes.to_vec())
    }

    async fn unpin(&self, cid: &Cid) -> Result<bool> {
        let response = self
            .http
            .post(self.endpoint("pin/rm")?)
            .query(&[("arg", cid.as_str())])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to unpin from IPFS: {}", e)))?;

        if response.status().is_success() {
            return Ok(true);
        }
        match Self::failure(response).await {
            Error::Network(message) if message.contains("not pinned") => Ok(false),
            Error::NotFound(_) => Ok(false),
            other => Err(other),
        }
    }

    async fn version(&self) -> Result<String> {
        let response = self
            .http
            .post(self.endpoint("version")?)
            .send()
            .await
            .map_err(|e| Error::Network(format!("IPFS node unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }
        let version: VersionResponse = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("Failed to parse version response: {}", e)))?;
        Ok(version.version)
    }
}
