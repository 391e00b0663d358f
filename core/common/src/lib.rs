//! Common utilities and types shared across the TACo storage crates.
//!
//! This module provides the error taxonomy every layer reports through and
//! the identifier type the orchestrator hands out to callers.

pub mod error;
pub mod types;

pub use error::{BoxError, Error, Result};
pub use types::ObjectId;
