//! Encryption boundary for TACo storage.
//!
//! This module provides:
//! - The `EncryptionService` trait the orchestrator encrypts and decrypts through
//! - Access conditions and the caller auth context they are checked against
//! - The `MessageKit` ciphertext envelope and its byte codec
//! - A local, single-key service backed by XChaCha20-Poly1305 for development
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - The access condition is bound to the ciphertext as associated data

pub mod aead;
pub mod condition;
pub mod kdf;
pub mod keys;
pub mod kit;
pub mod local;
pub mod service;

pub use condition::{AuthContext, ChainHandle, Condition, Domain, TokenHolding};
pub use kdf::{derive_key, KdfParams};
pub use keys::{MasterKey, ObjectKey, Salt};
pub use kit::MessageKit;
pub use local::LocalEncryptionService;
pub use service::{Encrypted, EncryptionConfig, EncryptionService};
