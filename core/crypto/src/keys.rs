//! Key types with secure memory handling.
//!
//! All key types automatically zeroize their memory on drop to prevent
//! sensitive data from persisting in memory.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use chacha20poly1305::aead::{KeyInit, OsRng};
use chacha20poly1305::XChaCha20Poly1305;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Root key of the local encryption service.
///
/// Every message kit is sealed under a key derived from this one and the
/// kit's random identifier.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_LENGTH],
}

impl MasterKey {
    /// Create a master key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Generate a random master key.
    pub fn generate() -> Self {
        let generated = XChaCha20Poly1305::generate_key(&mut OsRng);
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&generated);
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Derive the key that seals one message kit.
    ///
    /// Uses blake2b over the master key, the kit id and the domain name, so
    /// kits never share a key and a kit cannot be opened under another domain.
    pub fn derive_object_key(&self, kit_id: &[u8], domain: &str) -> ObjectKey {
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(self.key);
        hasher.update(kit_id);
        hasher.update(domain.as_bytes());
        hasher.update(b"objectkey");

        let result = hasher.finalize();
        let mut derived = [0u8; KEY_LENGTH];
        derived.copy_from_slice(&result);
        ObjectKey::from_bytes(derived)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey([REDACTED])")
    }
}

/// Key sealing a single message kit.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ObjectKey {
    key: [u8; KEY_LENGTH],
}

impl ObjectKey {
    /// Create an object key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey([REDACTED])")
    }
}

/// Salt for key derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Salt(pub [u8; 32]);

impl Salt {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Deterministic salt bound to a domain name.
    ///
    /// Lets the same passphrase open the same data across restarts without
    /// persisting a salt next to the store.
    pub fn for_domain(domain: &str) -> Self {
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(b"tacostore-salt");
        hasher.update(domain.as_bytes());
        let mut salt = [0u8; 32];
        salt.copy_from_slice(&hasher.finalize());
        Self(salt)
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_object_key() {
        let master = MasterKey::from_bytes([1u8; KEY_LENGTH]);

        let key1 = master.derive_object_key(b"kit-1", "lynx");
        let key2 = master.derive_object_key(b"kit-1", "lynx");
        assert_eq!(key1.as_bytes(), key2.as_bytes());

        let other_kit = master.derive_object_key(b"kit-2", "lynx");
        assert_ne!(key1.as_bytes(), other_kit.as_bytes());

        let other_domain = master.derive_object_key(b"kit-1", "mainnet");
        assert_ne!(key1.as_bytes(), other_domain.as_bytes());
    }

    #[test]
    fn test_master_key_generate() {
        let key1 = MasterKey::generate();
        let key2 = MasterKey::generate();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_salt_for_domain() {
        assert_eq!(
            Salt::for_domain("lynx").as_bytes(),
            Salt::for_domain("lynx").as_bytes()
        );
        assert_ne!(
            Salt::for_domain("lynx").as_bytes(),
            Salt::for_domain("tapir").as_bytes()
        );
    }

    #[test]
    fn test_debug_redacts() {
        let key = MasterKey::from_bytes([9u8; KEY_LENGTH]);
        assert_eq!(format!("{:?}", key), "MasterKey([REDACTED])");
    }
}
