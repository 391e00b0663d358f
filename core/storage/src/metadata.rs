//! Metadata envelope carried between encryption and storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use tacostore_common::{Error, Result};

/// Content type used when the caller does not supply one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Encryption details needed to decrypt a stored object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionMetadata {
    /// Serialized message kit.
    pub message_kit: Vec<u8>,
    /// Access condition, opaque to storage.
    pub conditions: Value,
}

/// Metadata for a stored object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageMetadata {
    /// Caller-facing identifier, unique per logical object.
    pub id: String,
    /// MIME type of the plaintext.
    pub content_type: String,
    /// Length of the encrypted payload handed to the backend.
    pub size: u64,
    /// Store time.
    pub created_at: DateTime<Utc>,
    /// Caller-supplied metadata, copied verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_metadata: Option<Map<String, Value>>,
    /// Encryption details.
    pub encryption_metadata: EncryptionMetadata,
    /// Backend-native identifier, e.g. a content hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_hash: Option<String>,
}

impl StorageMetadata {
    /// A custom metadata value by key.
    pub fn custom(&self, key: &str) -> Option<&Value> {
        self.custom_metadata.as_ref()?.get(key)
    }
}

/// Outcome of a successful store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageResult {
    /// Logical id.
    pub id: String,
    /// Backend-scoped locator; not portable across adapters.
    pub reference: String,
    /// Metadata as persisted.
    pub metadata: StorageMetadata,
}

/// JSON layout content-addressed backends persist.
///
/// `{ "data": [bytes…], "metadata": { …, "createdAt": "<ISO-8601>" } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEnvelope {
    pub data: Vec<u8>,
    pub metadata: StorageMetadata,
}

impl StoredEnvelope {
    /// Serialize to JSON bytes.
    ///
    /// # Errors
    /// - `Storage` if serialization fails
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Storage {
            message: format!("Failed to encode envelope: {}", e),
            source: Some(Box::new(e)),
        })
    }

    /// Serialize to a JSON value.
    ///
    /// # Errors
    /// - `Storage` if serialization fails
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| Error::Storage {
            message: format!("Failed to encode envelope: {}", e),
            source: Some(Box::new(e)),
        })
    }

    /// Deserialize from JSON bytes.
    ///
    /// # Errors
    /// - `Retrieval` if the bytes are not an envelope
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Retrieval {
            message: format!("Stored object is not a valid envelope: {}", e),
            source: Some(Box::new(e)),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Metadata for adapter tests; `size` matches `payload`.
    pub(crate) fn sample_metadata(id: &str, payload: &[u8]) -> StorageMetadata {
        let mut custom = Map::new();
        custom.insert("author".to_string(), json!("test-user"));
        StorageMetadata {
            id: id.to_string(),
            content_type: "text/plain".to_string(),
            size: payload.len() as u64,
            created_at: Utc::now(),
            custom_metadata: Some(custom),
            encryption_metadata: EncryptionMetadata {
                message_kit: payload.to_vec(),
                conditions: json!({"conditionType": "time", "chain": 80002}),
            },
            backend_hash: None,
        }
    }

    #[test]
    fn test_metadata_wire_names() {
        let metadata = sample_metadata("doc-1", b"kit");
        let json = serde_json::to_value(&metadata).unwrap();

        assert_eq!(json["contentType"], "text/plain");
        assert!(json["createdAt"].as_str().unwrap().contains('T'));
        assert_eq!(json["customMetadata"]["author"], "test-user");
        assert_eq!(json["encryptionMetadata"]["messageKit"], json!([107, 105, 116]));
        assert!(json.get("backendHash").is_none());
    }

    #[test]
    fn test_envelope_layout() {
        let metadata = sample_metadata("doc-1", &[1, 2, 3]);
        let envelope = StoredEnvelope {
            data: vec![1, 2, 3],
            metadata: metadata.clone(),
        };

        let bytes = envelope.to_bytes().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["data"], json!([1, 2, 3]));
        assert_eq!(value["metadata"]["id"], "doc-1");

        let decoded = StoredEnvelope::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.metadata, metadata);
    }

    #[test]
    fn test_invalid_envelope_is_retrieval_error() {
        let result = StoredEnvelope::from_bytes(b"{\"data\": 3}");
        assert!(matches!(result, Err(Error::Retrieval { .. })));
    }

    #[test]
    fn test_custom_lookup() {
        let metadata = sample_metadata("doc-1", b"x");
        assert_eq!(metadata.custom("author"), Some(&json!("test-user")));
        assert_eq!(metadata.custom("missing"), None);
    }
}
