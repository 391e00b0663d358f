//! Storage adapter abstraction for TACo storage.
//!
//! This module provides the contract every backend implements, the metadata
//! envelope that travels between encryption and storage, the reference
//! grammar each backend resolves, and the adapters themselves
//! (in-memory, SQLite, IPFS node, Pinata) plus a registry for resolving
//! them from configuration.
//!
//! # Design Principles
//! - Backends only ever see ciphertext; they never decrypt
//! - Adapters accept the caller's logical id and resolve it to their own
//!   locator scheme, and also accept their own full references
//! - References of one backend are rejected by every other backend
//! - Unified error semantics: absence is `NotFound`/`false`, never a failure

pub mod adapter;
pub mod helpers;
pub mod ipfs;
pub mod memory;
pub mod metadata;
pub mod pinata;
pub mod reference;
pub mod registry;
pub mod sqlite;

pub use adapter::{HealthStatus, StorageAdapter, StoredObject};
pub use ipfs::{HttpIpfsClient, IpfsAdapter, IpfsApi, IpfsConfig, MemoryIpfsNode};
pub use memory::MemoryAdapter;
pub use metadata::{EncryptionMetadata, StorageMetadata, StorageResult, StoredEnvelope};
pub use pinata::{HttpPinataClient, PinataAdapter, PinataApi, PinataConfig};
pub use reference::{Cid, Reference};
pub use registry::{create_default_registry, AdapterFactory, AdapterRegistry};
pub use sqlite::{SqliteAdapter, SqliteConfig};
