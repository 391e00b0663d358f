//! Storage orchestrator for TACo storage.
//!
//! This module provides:
//! - `TacoStorage`, the public entry point that encrypts, stores, retrieves
//!   and decrypts objects through an injected adapter and encryption service
//! - `StorageConfig`, the serializable orchestrator configuration
//! - Convenience constructors per backend
//!
//! # Pipeline
//! Writes flow plaintext → message kit → metadata → adapter. Reads flow the
//! reverse. Encryption always completes before anything is persisted; a
//! failed write leaves nothing behind to roll back.

pub mod config;
pub mod storage;

pub use config::{AdapterConfig, StorageConfig, DEFAULT_EXPIRY_SECS, DEFAULT_RITUAL_ID};
pub use storage::{RetrievalResult, StoreOptions, TacoStorage};
