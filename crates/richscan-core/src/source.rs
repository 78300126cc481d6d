//! The `IndexerSource` trait: the engine's view of the upstream indexer.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ScanError;
use crate::profile::ScannerProfile;
use crate::types::{BlockPayload, IndexerBlock, Transaction};

/// Read access to a block/transaction indexer.
///
/// Implementations must be `Send + Sync`; the engine holds them as
/// `Arc<dyn IndexerSource>` so the runner can swap endpoints on failover.
#[async_trait]
pub trait IndexerSource: Send + Sync + 'static {
    /// Current best chain height.
    async fn get_height(&self) -> Result<u64, ScanError>;

    /// Block at `height`, with either inline transactions or references.
    async fn get_block(&self, height: u64) -> Result<IndexerBlock, ScanError>;

    /// Fetch a single transaction by id (for `BlockPayload::TxRefs`).
    async fn get_transaction(&self, txid: &str) -> Result<Transaction, ScanError>;

    /// Adopt the timeout/retry settings of a newly active profile.
    fn configure(&self, _profile: &ScannerProfile) {}

    /// The endpoint this source talks to (used for profile classification).
    fn endpoint(&self) -> &str;
}

// ─── In-memory source (for testing) ───────────────────────────────────────────

#[derive(Default)]
struct MemoryChain {
    blocks: BTreeMap<u64, IndexerBlock>,
    txs: HashMap<String, Transaction>,
    fail_heights: HashSet<u64>,
    block_fetches: Vec<u64>,
    configured: Option<ScannerProfile>,
}

/// In-memory indexer for tests and replaying fixtures.
pub struct MemorySource {
    endpoint: String,
    chain: Mutex<MemoryChain>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new("memory://local")
    }
}

impl MemorySource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            chain: Mutex::new(MemoryChain::default()),
        }
    }

    /// Add a block whose transactions are inlined.
    pub fn push_inline(&self, height: u64, txs: Vec<Transaction>) {
        self.chain.lock().unwrap().blocks.insert(
            height,
            IndexerBlock {
                height,
                hash: format!("hash-{height}"),
                payload: BlockPayload::InlineTxs(txs),
            },
        );
    }

    /// Add a block that only references its transactions by id.
    pub fn push_refs(&self, height: u64, txs: Vec<Transaction>) {
        let mut chain = self.chain.lock().unwrap();
        let ids = txs.iter().map(|t| t.txid.clone()).collect();
        for tx in txs {
            chain.txs.insert(tx.txid.clone(), tx);
        }
        chain.blocks.insert(
            height,
            IndexerBlock {
                height,
                hash: format!("hash-{height}"),
                payload: BlockPayload::TxRefs(ids),
            },
        );
    }

    /// Make every fetch of `height` fail with a transport error.
    pub fn fail_at(&self, height: u64) {
        self.chain.lock().unwrap().fail_heights.insert(height);
    }

    pub fn heal(&self, height: u64) {
        self.chain.lock().unwrap().fail_heights.remove(&height);
    }

    /// Heights requested through `get_block`, in order.
    pub fn block_fetches(&self) -> Vec<u64> {
        self.chain.lock().unwrap().block_fetches.clone()
    }

    /// The last profile passed to `configure`.
    pub fn configured_profile(&self) -> Option<ScannerProfile> {
        self.chain.lock().unwrap().configured
    }
}

#[async_trait]
impl IndexerSource for MemorySource {
    async fn get_height(&self) -> Result<u64, ScanError> {
        Ok(self
            .chain
            .lock()
            .unwrap()
            .blocks
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0))
    }

    async fn get_block(&self, height: u64) -> Result<IndexerBlock, ScanError> {
        let mut chain = self.chain.lock().unwrap();
        chain.block_fetches.push(height);
        if chain.fail_heights.contains(&height) {
            return Err(ScanError::Indexer(format!("simulated outage at block {height}")));
        }
        chain
            .blocks
            .get(&height)
            .cloned()
            .ok_or(ScanError::BlockNotFound { height })
    }

    async fn get_transaction(&self, txid: &str) -> Result<Transaction, ScanError> {
        self.chain
            .lock()
            .unwrap()
            .txs
            .get(txid)
            .cloned()
            .ok_or_else(|| ScanError::Malformed(format!("unknown transaction {txid}")))
    }

    fn configure(&self, profile: &ScannerProfile) {
        self.chain.lock().unwrap().configured = Some(*profile);
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_source_serves_both_shapes() {
        let src = MemorySource::default();
        let tx = Transaction {
            txid: "aa".into(),
            inputs: vec![],
            outputs: vec![],
        };
        src.push_inline(1, vec![tx.clone()]);
        src.push_refs(2, vec![tx.clone()]);

        assert_eq!(src.get_height().await.unwrap(), 2);
        assert!(matches!(src.get_block(1).await.unwrap().payload, BlockPayload::InlineTxs(_)));
        assert_eq!(
            src.get_block(2).await.unwrap().payload,
            BlockPayload::TxRefs(vec!["aa".into()])
        );
        assert_eq!(src.get_transaction("aa").await.unwrap(), tx);
        assert!(matches!(src.get_block(3).await, Err(ScanError::BlockNotFound { height: 3 })));
    }
}
