//! Rich-list snapshots: the ranked, filtered view of the ledger that the
//! snapshot server publishes.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::ledger::BalanceLedger;
use crate::storage;
use crate::types::to_coins;

/// Default file name inside the data directory.
pub const SNAPSHOT_FILE: &str = "rich-list.json";

/// Largest page the paginated view hands out.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Page size used when the client does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// One ranked address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RichListEntry {
    /// 1-based, contiguous over the listed addresses.
    pub rank: u64,
    pub address: String,
    pub balance: f64,
    /// Share of the unfiltered total supply, in percent.
    pub percentage: f64,
    pub tx_count: u64,
}

/// The published rich list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RichListSnapshot {
    pub last_update: DateTime<Utc>,
    pub last_block_height: u64,
    /// Sum of every ledger balance, including addresses below the threshold.
    pub total_supply: f64,
    /// Every address in the ledger, including addresses below the threshold.
    pub total_addresses: u64,
    /// Inclusion threshold the list was built with.
    pub min_balance: f64,
    pub addresses: Vec<RichListEntry>,
}

/// Snapshot fields without the address list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub last_update: DateTime<Utc>,
    pub last_block_height: u64,
    pub total_supply: f64,
    pub total_addresses: u64,
    pub min_balance: f64,
    /// Number of addresses in the published list.
    pub listed_addresses: u64,
}

/// One page of the rich list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RichListPage {
    #[serde(flatten)]
    pub metadata: SnapshotMetadata,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub addresses: Vec<RichListEntry>,
}

impl RichListSnapshot {
    /// Rank the ledger.
    ///
    /// Addresses below `min_balance` (subunits) are left out of the list but
    /// still count toward `total_supply` and therefore every percentage.
    /// Ties keep ledger insertion order.
    pub fn build(ledger: &BalanceLedger, height: u64, min_balance: i64, now: DateTime<Utc>) -> Self {
        let supply = ledger.total_supply();
        let mut accounts = ledger.accounts();
        let total_addresses = accounts.len() as u64;

        accounts.retain(|a| a.balance >= min_balance);
        // stable: equal balances keep insertion order
        accounts.sort_by(|a, b| b.balance.cmp(&a.balance));

        let addresses = accounts
            .into_iter()
            .enumerate()
            .map(|(i, a)| RichListEntry {
                rank: i as u64 + 1,
                address: a.address.to_string(),
                balance: to_coins(a.balance),
                percentage: if supply > 0 {
                    a.balance as f64 / supply as f64 * 100.0
                } else {
                    0.0
                },
                tx_count: a.tx_count,
            })
            .collect();

        Self {
            last_update: now,
            last_block_height: height,
            total_supply: to_coins(supply),
            total_addresses,
            min_balance: to_coins(min_balance),
            addresses,
        }
    }

    pub fn metadata(&self) -> SnapshotMetadata {
        SnapshotMetadata {
            last_update: self.last_update,
            last_block_height: self.last_block_height,
            total_supply: self.total_supply,
            total_addresses: self.total_addresses,
            min_balance: self.min_balance,
            listed_addresses: self.addresses.len() as u64,
        }
    }

    /// Slice out one page. `page` is 1-based (0 is read as 1); `page_size`
    /// is clamped to `1..=MAX_PAGE_SIZE`. Pages past the end are empty.
    pub fn paginate(&self, page: usize, page_size: usize) -> RichListPage {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let total = self.addresses.len();
        let total_pages = total.div_ceil(page_size);

        let start = (page - 1).saturating_mul(page_size);
        let addresses = if start < total {
            let end = (start + page_size).min(total);
            self.addresses[start..end].to_vec()
        } else {
            Vec::new()
        };

        RichListPage {
            metadata: self.metadata(),
            page,
            page_size,
            total_pages,
            addresses,
        }
    }
}

// ─── Stores ───────────────────────────────────────────────────────────────────

/// Where the engine publishes snapshots and the server reads them.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// The latest snapshot, or `None` if none was ever written.
    async fn load(&self) -> Result<Option<RichListSnapshot>, ScanError>;

    /// Replace the published snapshot as a whole.
    async fn save(&self, snapshot: &RichListSnapshot) -> Result<(), ScanError>;

    /// Whether a snapshot has been published.
    async fn exists(&self) -> bool;
}

/// Snapshot kept as a JSON document on disk.
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_dir>/rich-list.json`
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::new(data_dir.as_ref().join(SNAPSHOT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn load(&self) -> Result<Option<RichListSnapshot>, ScanError> {
        storage::read_json(&self.path).await
    }

    async fn save(&self, snapshot: &RichListSnapshot) -> Result<(), ScanError> {
        storage::write_json_atomic(&self.path, snapshot).await
    }

    async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }
}

/// In-memory snapshot store for tests.
#[derive(Default)]
pub struct MemorySnapshotStore {
    data: Mutex<Option<RichListSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<Option<RichListSnapshot>, ScanError> {
        Ok(self.data.lock().unwrap().clone())
    }

    async fn save(&self, snapshot: &RichListSnapshot) -> Result<(), ScanError> {
        *self.data.lock().unwrap() = Some(snapshot.clone());
        Ok(())
    }

    async fn exists(&self) -> bool {
        self.data.lock().unwrap().is_some()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{from_coins, SUBUNITS_PER_COIN};

    const COIN: i64 = SUBUNITS_PER_COIN;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn ledger_of(n: usize) -> BalanceLedger {
        BalanceLedger::from_accounts((0..n).map(|i| (format!("addr{i}"), (i as i64 + 1) * COIN, 1)))
    }

    #[test]
    fn ranks_and_percentages() {
        let ledger = BalanceLedger::from_accounts([("A", 10 * COIN, 2), ("B", 30 * COIN, 1), ("C", 60 * COIN, 5)]);
        let snap = RichListSnapshot::build(&ledger, 42, COIN, now());

        assert_eq!(snap.total_supply, 100.0);
        assert_eq!(snap.total_addresses, 3);
        assert_eq!(snap.last_block_height, 42);
        let ranked: Vec<_> = snap.addresses.iter().map(|e| (e.rank, e.address.as_str())).collect();
        assert_eq!(ranked, vec![(1, "C"), (2, "B"), (3, "A")]);
        for e in &snap.addresses {
            assert!((e.percentage - e.balance / snap.total_supply * 100.0).abs() < 1e-9);
        }
        assert_eq!(snap.addresses[0].tx_count, 5);
    }

    #[test]
    fn below_threshold_still_counts_toward_supply() {
        let ledger = BalanceLedger::from_accounts([("dust", from_coins(0.5), 1), ("whale", from_coins(1.5), 1)]);
        let snap = RichListSnapshot::build(&ledger, 1, COIN, now());

        assert_eq!(snap.addresses.len(), 1);
        assert_eq!(snap.addresses[0].address, "whale");
        assert_eq!(snap.total_supply, 2.0);
        assert_eq!(snap.total_addresses, 2);
        assert!((snap.addresses[0].percentage - 75.0).abs() < 1e-9);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let ledger = BalanceLedger::from_accounts([("first", COIN, 1), ("second", COIN, 1), ("big", 2 * COIN, 1)]);
        let snap = RichListSnapshot::build(&ledger, 1, 0, now());
        let order: Vec<_> = snap.addresses.iter().map(|e| e.address.as_str()).collect();
        assert_eq!(order, vec!["big", "first", "second"]);
    }

    #[test]
    fn empty_ledger() {
        let snap = RichListSnapshot::build(&BalanceLedger::new(), 0, COIN, now());
        assert!(snap.addresses.is_empty());
        assert_eq!(snap.total_supply, 0.0);
        assert_eq!(snap.paginate(1, 100).total_pages, 0);
    }

    #[test]
    fn pagination() {
        let snap = RichListSnapshot::build(&ledger_of(250), 9, 0, now());

        let p3 = snap.paginate(3, 100);
        assert_eq!(p3.addresses.len(), 50);
        assert_eq!(p3.total_pages, 3);
        assert_eq!(p3.addresses[0].rank, 201);

        let p4 = snap.paginate(4, 100);
        assert!(p4.addresses.is_empty());
        assert_eq!(p4.total_pages, 3);
    }

    #[test]
    fn pagination_clamps_inputs() {
        let snap = RichListSnapshot::build(&ledger_of(1500), 9, 0, now());

        let big = snap.paginate(1, 5000);
        assert_eq!(big.page_size, MAX_PAGE_SIZE);
        assert_eq!(big.addresses.len(), 1000);
        assert_eq!(big.total_pages, 2);

        let zero = snap.paginate(0, 0);
        assert_eq!(zero.page, 1);
        assert_eq!(zero.page_size, 1);
        assert_eq!(zero.addresses[0].rank, 1);
    }

    #[test]
    fn page_serializes_flat() {
        let snap = RichListSnapshot::build(&ledger_of(3), 5, 0, now());
        let v = serde_json::to_value(snap.paginate(1, 2)).unwrap();
        assert_eq!(v["lastBlockHeight"], 5);
        assert_eq!(v["totalPages"], 2);
        assert_eq!(v["pageSize"], 2);
        assert_eq!(v["addresses"].as_array().unwrap().len(), 2);
        assert_eq!(v["addresses"][0]["txCount"], 1);
    }

    #[tokio::test]
    async fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSnapshotStore::in_dir(dir.path());
        assert!(!store.exists().await);
        assert!(store.load().await.unwrap().is_none());

        let snap = RichListSnapshot::build(&ledger_of(4), 7, 0, now());
        store.save(&snap).await.unwrap();
        assert!(store.exists().await);
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.last_block_height, 7);
        assert_eq!(loaded.last_update, snap.last_update);
        assert_eq!(loaded.addresses.len(), 4);
        assert_eq!(loaded.addresses[0].address, "addr3");
    }
}
