//! Checkpoint manager: persists the full ledger and scan position so a
//! restarted scanner resumes instead of rescanning from genesis.
//!
//! The on-disk record is an explicit, versioned schema. A record that is
//! missing, unreadable or carries an unknown `schemaVersion` is treated as
//! absent: the scanner restarts from height 0, never fails.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::ledger::BalanceLedger;
use crate::storage;
use crate::types::to_coins;

/// Current checkpoint schema version.
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// Default file name inside the data directory.
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// A persisted scan checkpoint.
///
/// `balances` are integer subunits; map order is ledger insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanCheckpoint {
    pub schema_version: u32,
    /// Highest block fully applied to the ledger.
    pub last_scanned_height: u64,
    pub balances: IndexMap<String, i64>,
    pub tx_counts: IndexMap<String, u64>,
    /// Sum of `balances`, in coins.
    pub total_supply: f64,
    /// Unix timestamp of when this checkpoint was saved.
    pub updated_at: i64,
}

impl ScanCheckpoint {
    /// Capture the ledger at `height`.
    pub fn from_ledger(height: u64, ledger: &BalanceLedger) -> Self {
        let accounts = ledger.accounts();
        let mut balances = IndexMap::with_capacity(accounts.len());
        let mut tx_counts = IndexMap::with_capacity(accounts.len());
        for account in accounts {
            balances.insert(account.address.to_string(), account.balance);
            tx_counts.insert(account.address.to_string(), account.tx_count);
        }
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            last_scanned_height: height,
            balances,
            tx_counts,
            total_supply: to_coins(ledger.total_supply()),
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Check the record for internal consistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version != CHECKPOINT_SCHEMA_VERSION {
            return Err(format!(
                "unsupported schema version {} (expected {CHECKPOINT_SCHEMA_VERSION})",
                self.schema_version
            ));
        }
        if let Some((address, balance)) = self.balances.iter().find(|(_, b)| **b <= 0) {
            return Err(format!("non-positive balance {balance} for {address}"));
        }
        Ok(())
    }

    /// Rebuild the in-memory ledger. Addresses without a recorded count start
    /// at 0.
    pub fn into_ledger(self) -> (u64, BalanceLedger) {
        let Self {
            last_scanned_height,
            balances,
            tx_counts,
            ..
        } = self;
        let ledger = BalanceLedger::from_accounts(balances.into_iter().map(|(address, balance)| {
            let count = tx_counts.get(&address).copied().unwrap_or(0);
            (address, balance, count)
        }));
        (last_scanned_height, ledger)
    }
}

/// Trait for storing and loading the scan checkpoint.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint. `Ok(None)` if none exists; `Err` if it exists but
    /// cannot be read or parsed.
    async fn load(&self) -> Result<Option<ScanCheckpoint>, ScanError>;

    /// Replace the checkpoint.
    async fn save(&self, checkpoint: &ScanCheckpoint) -> Result<(), ScanError>;

    /// Delete the checkpoint (forces a full rescan).
    async fn delete(&self) -> Result<(), ScanError>;
}

/// Manages checkpoint reads/writes for the scan engine.
pub struct CheckpointManager {
    store: Box<dyn CheckpointStore>,
    /// How often to save (every N blocks).
    save_interval: u64,
    /// Block counter since last save.
    counter: u64,
}

impl CheckpointManager {
    pub fn new(store: Box<dyn CheckpointStore>, save_interval: u64) -> Self {
        Self {
            store,
            save_interval: save_interval.max(1),
            counter: 0,
        }
    }

    pub fn set_interval(&mut self, save_interval: u64) {
        self.save_interval = save_interval.max(1);
    }

    /// Load the saved position and ledger, falling back to an empty ledger at
    /// height 0 when the checkpoint is absent or unusable.
    pub async fn load_or_default(&mut self) -> (u64, BalanceLedger) {
        self.counter = 0;
        match self.store.load().await {
            Ok(Some(cp)) => match cp.validate() {
                Ok(()) => {
                    let (height, ledger) = cp.into_ledger();
                    tracing::info!(height, addresses = ledger.len(), "Resuming from checkpoint");
                    (height, ledger)
                }
                Err(reason) => {
                    tracing::warn!(%reason, "Discarding invalid checkpoint, rescanning from genesis");
                    (0, BalanceLedger::new())
                }
            },
            Ok(None) => {
                tracing::info!("No checkpoint found, scanning from genesis");
                (0, BalanceLedger::new())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable checkpoint, rescanning from genesis");
                (0, BalanceLedger::new())
            }
        }
    }

    /// Whether the next `maybe_save` call will write.
    pub fn is_due(&self) -> bool {
        self.counter + 1 >= self.save_interval
    }

    /// Conditionally save every `save_interval` blocks.
    ///
    /// Call this after each block is fully applied. Returns `true` when a
    /// checkpoint was written.
    pub async fn maybe_save(&mut self, height: u64, ledger: &BalanceLedger) -> Result<bool, ScanError> {
        self.counter += 1;
        if self.counter >= self.save_interval {
            self.force_save(height, ledger).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Immediately save a checkpoint (used on completion and on failure).
    pub async fn force_save(&mut self, height: u64, ledger: &BalanceLedger) -> Result<(), ScanError> {
        let cp = ScanCheckpoint::from_ledger(height, ledger);
        self.store.save(&cp).await?;
        self.counter = 0;
        tracing::debug!(height, addresses = cp.balances.len(), "Checkpoint saved");
        Ok(())
    }
}

// ─── JSON file store ──────────────────────────────────────────────────────────

/// Checkpoint kept as a human-readable JSON document on disk.
pub struct JsonFileCheckpointStore {
    path: PathBuf,
}

impl JsonFileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_dir>/checkpoint.json`
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::new(data_dir.as_ref().join(CHECKPOINT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CheckpointStore for JsonFileCheckpointStore {
    async fn load(&self) -> Result<Option<ScanCheckpoint>, ScanError> {
        storage::read_json(&self.path).await
    }

    async fn save(&self, checkpoint: &ScanCheckpoint) -> Result<(), ScanError> {
        storage::write_json_atomic(&self.path, checkpoint).await
    }

    async fn delete(&self) -> Result<(), ScanError> {
        storage::remove_optional(&self.path).await
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory checkpoint store for tests and ephemeral scanners.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: Mutex<Option<ScanCheckpoint>>,
    saves: Mutex<Vec<u64>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Heights of every checkpoint saved so far, in order.
    pub fn saved_heights(&self) -> Vec<u64> {
        self.saves.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> Result<Option<ScanCheckpoint>, ScanError> {
        Ok(self.data.lock().unwrap().clone())
    }

    async fn save(&self, checkpoint: &ScanCheckpoint) -> Result<(), ScanError> {
        self.saves.lock().unwrap().push(checkpoint.last_scanned_height);
        *self.data.lock().unwrap() = Some(checkpoint.clone());
        Ok(())
    }

    async fn delete(&self) -> Result<(), ScanError> {
        self.data.lock().unwrap().take();
        Ok(())
    }
}

// Shared handles are handy when a test wants to inspect the store the engine owns.
#[async_trait]
impl<T: CheckpointStore + ?Sized> CheckpointStore for std::sync::Arc<T> {
    async fn load(&self) -> Result<Option<ScanCheckpoint>, ScanError> {
        (**self).load().await
    }

    async fn save(&self, checkpoint: &ScanCheckpoint) -> Result<(), ScanError> {
        (**self).save(checkpoint).await
    }

    async fn delete(&self) -> Result<(), ScanError> {
        (**self).delete().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Transaction, TxInput, TxOutput};

    fn funded_ledger() -> BalanceLedger {
        let mut ledger = BalanceLedger::new();
        ledger.apply_transaction(&Transaction {
            txid: "cb".into(),
            inputs: vec![TxInput::generation()],
            outputs: vec![TxOutput::pay("B", 300), TxOutput::pay("A", 500)],
        });
        ledger
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let mut mgr = CheckpointManager::new(Box::new(MemoryCheckpointStore::new()), 10);

        let (height, ledger) = mgr.load_or_default().await;
        assert_eq!(height, 0);
        assert!(ledger.is_empty());

        mgr.force_save(1000, &funded_ledger()).await.unwrap();

        let (height, ledger) = mgr.load_or_default().await;
        assert_eq!(height, 1000);
        assert_eq!(ledger.balance("A"), Some(500));
        assert_eq!(ledger.tx_count("B"), Some(1));
        let order: Vec<_> = ledger.accounts().iter().map(|a| a.address.to_string()).collect();
        assert_eq!(order, vec!["B", "A"]);
    }

    #[tokio::test]
    async fn checkpoint_save_interval() {
        let store = std::sync::Arc::new(MemoryCheckpointStore::new());
        let mut mgr = CheckpointManager::new(Box::new(store.clone()), 5);
        let ledger = funded_ledger();

        // Process 4 blocks, should not save yet
        for i in 1..=4 {
            assert!(!mgr.maybe_save(i, &ledger).await.unwrap());
        }
        assert!(store.saved_heights().is_empty());

        // 5th block, should save
        assert!(mgr.maybe_save(5, &ledger).await.unwrap());
        assert_eq!(store.saved_heights(), vec![5]);
    }

    #[tokio::test]
    async fn corrupt_file_falls_back_to_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCheckpointStore::in_dir(dir.path());
        tokio::fs::write(store.path(), b"{ not json").await.unwrap();

        let mut mgr = CheckpointManager::new(Box::new(store), 10);
        let (height, ledger) = mgr.load_or_default().await;
        assert_eq!(height, 0);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn unknown_schema_version_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCheckpointStore::in_dir(dir.path());
        let mut cp = ScanCheckpoint::from_ledger(77, &funded_ledger());
        cp.schema_version = 99;
        store.save(&cp).await.unwrap();

        let mut mgr = CheckpointManager::new(Box::new(store), 10);
        assert_eq!(mgr.load_or_default().await.0, 0);
    }

    #[tokio::test]
    async fn file_store_document_shape() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCheckpointStore::in_dir(dir.path());
        store.save(&ScanCheckpoint::from_ledger(12, &funded_ledger())).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(store.path()).await.unwrap()).unwrap();
        assert_eq!(raw["schemaVersion"], 1);
        assert_eq!(raw["lastScannedHeight"], 12);
        assert_eq!(raw["balances"]["A"], 500);
        assert_eq!(raw["txCounts"]["B"], 1);
        assert!(raw["totalSupply"].is_number());

        store.delete().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}
