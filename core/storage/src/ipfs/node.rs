//! In-process IPFS node for tests and development.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::client::IpfsApi;
use crate::reference::Cid;
use tacostore_common::{Error, Result};

const VERSION: &str = "memory-0.1.0";

/// Content-addressed block store held in memory.
///
/// CIDs are computed the way a node computes CIDv0 for raw content, so the
/// same bytes always map to the same CID. `set_online(false)` makes every
/// call fail with a network error, like an unreachable node.
pub struct MemoryIpfsNode {
    blocks: RwLock<HashMap<Cid, Vec<u8>>>,
    pins: RwLock<HashSet<Cid>>,
    online: AtomicBool,
}

impl MemoryIpfsNode {
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
            pins: RwLock::new(HashSet::new()),
            online: AtomicBool::new(true),
        }
    }

    /// Simulate the node going up or down.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Whether `cid` is currently pinned.
    pub async fn is_pinned(&self, cid: &Cid) -> bool {
        self.pins.read().await.contains(cid)
    }

    fn check_online(&self) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Network("IPFS node unreachable".to_string()))
        }
    }
}

impl Default for MemoryIpfsNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IpfsApi for MemoryIpfsNode {
    async fn add(&self, data: Vec<u8>) -> Result<Cid> {
        self.check_online()?;
        let cid = Cid::v0_of(&data);
        self.blocks.write().await.insert(cid.clone(), data);
        self.pins.write().await.insert(cid.clone());
        Ok(cid)
    }

    async fn cat(&self, cid: &Cid) -> Result<Vec<u8>> {
        self.check_online()?;
        // Unpinned blocks stay readable until garbage collection, which
        // this node never runs.
        self.blocks
            .read()
            .await
            .get(cid)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("IPFS content not found: {}", cid)))
    }

    async fn unpin(&self, cid: &Cid) -> Result<bool> {
        self.check_online()?;
        Ok(self.pins.write().await.remove(cid))
    }

    async fn version(&self) -> Result<String> {
        self.check_online()?;
        Ok(VERSION.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_cat_unpin() {
        let node = MemoryIpfsNode::new();
        let cid = node.add(b"block".to_vec()).await.unwrap();

        assert_eq!(cid, Cid::v0_of(b"block"));
        assert_eq!(node.cat(&cid).await.unwrap(), b"block");
        assert!(node.is_pinned(&cid).await);

        assert!(node.unpin(&cid).await.unwrap());
        assert!(!node.unpin(&cid).await.unwrap());
    }

    #[tokio::test]
    async fn test_offline_node() {
        let node = MemoryIpfsNode::new();
        node.set_online(false);

        assert!(matches!(node.version().await, Err(Error::Network(_))));
        assert!(node.add(b"x".to_vec()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_content() {
        let node = MemoryIpfsNode::new();
        let cid = Cid::v0_of(b"never added");
        assert!(matches!(node.cat(&cid).await, Err(Error::NotFound(_))));
    }
}
