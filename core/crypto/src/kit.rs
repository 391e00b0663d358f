//! Message kit: the serialized ciphertext envelope.
//!
//! The storage layer treats a kit as an uninterpreted byte sequence. Only the
//! encryption service reads the header fields back.

use serde::{Deserialize, Serialize};

use crate::condition::{Condition, Domain};
use tacostore_common::{Error, Result};

/// Current kit format version.
pub const KIT_VERSION: u8 = 1;

/// Ciphertext plus everything needed to decrypt it under its condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKit {
    /// Kit format version.
    pub version: u8,
    /// Random identifier the sealing key is derived from.
    pub kit_id: Vec<u8>,
    /// Domain the kit was produced in.
    pub domain: Domain,
    /// Ritual (key-holder cohort) the kit belongs to.
    pub ritual_id: u32,
    /// Condition that gates decryption.
    pub condition: Condition,
    /// nonce || ciphertext || tag.
    pub ciphertext: Vec<u8>,
}

/// Authenticated header: every field except the ciphertext.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KitHeader<'a> {
    version: u8,
    kit_id: &'a [u8],
    domain: Domain,
    ritual_id: u32,
    condition: &'a Condition,
}

impl MessageKit {
    /// Bytes authenticated alongside the ciphertext.
    ///
    /// Changing the condition, domain or ritual of a stored kit makes it
    /// fail authentication.
    pub fn associated_data(&self) -> Result<Vec<u8>> {
        Self::header_bytes(
            self.version,
            &self.kit_id,
            self.domain,
            self.ritual_id,
            &self.condition,
        )
    }

    pub(crate) fn header_bytes(
        version: u8,
        kit_id: &[u8],
        domain: Domain,
        ritual_id: u32,
        condition: &Condition,
    ) -> Result<Vec<u8>> {
        let header = KitHeader {
            version,
            kit_id,
            domain,
            ritual_id,
            condition,
        };
        Ok(serde_json::to_vec(&header)?)
    }

    /// Serialize to bytes for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from bytes.
    ///
    /// # Errors
    /// - `Serialization` if the bytes are not a kit
    /// - `Decryption` if the kit version is unsupported
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let kit: Self = serde_json::from_slice(bytes)?;
        if kit.version != KIT_VERSION {
            return Err(Error::decryption(format!(
                "Unsupported message kit version: {}",
                kit.version
            )));
        }
        Ok(kit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn sample_kit() -> MessageKit {
        let now = Utc::now();
        MessageKit {
            version: KIT_VERSION,
            kit_id: vec![1, 2, 3, 4],
            domain: Domain::Lynx,
            ritual_id: 27,
            condition: Condition::time(80002, now + Duration::hours(1), now).unwrap(),
            ciphertext: vec![9; 48],
        }
    }

    #[test]
    fn test_kit_bytes_roundtrip() {
        let kit = sample_kit();
        let bytes = kit.to_bytes().unwrap();
        assert_eq!(MessageKit::from_bytes(&bytes).unwrap(), kit);
    }

    #[test]
    fn test_garbage_is_serialization_error() {
        let result = MessageKit::from_bytes(b"not a kit");
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_unsupported_version() {
        let mut kit = sample_kit();
        kit.version = 9;
        let bytes = kit.to_bytes().unwrap();
        assert!(matches!(
            MessageKit::from_bytes(&bytes),
            Err(Error::Decryption { .. })
        ));
    }

    #[test]
    fn test_associated_data_covers_condition() {
        let kit = sample_kit();
        let mut other = kit.clone();
        other.ritual_id = 28;
        assert_ne!(
            kit.associated_data().unwrap(),
            other.associated_data().unwrap()
        );
    }
}
