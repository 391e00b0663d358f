//! IPFS storage backend.
//!
//! Objects are persisted as JSON envelopes added (and pinned) through a node's
//! HTTP RPC API. References are `ipfs://<cid>`.

mod adapter;
mod client;
mod node;

pub use adapter::IpfsAdapter;
pub use client::{HttpIpfsClient, IpfsApi, IpfsConfig};
pub use node::MemoryIpfsNode;
