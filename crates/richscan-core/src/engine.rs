//! The scan engine: walks the chain from the last checkpoint to the indexer's
//! head and publishes a fresh rich list.
//!
//! # Pass lifecycle
//! ```text
//! Idle → LoadingCheckpoint → FetchingTargetHeight → Scanning(h) ⇄ Checkpointing
//!                                   │                     │
//!                                   └─ caught up ─► Idle  └─► EmittingSnapshot → Idle
//! any in-progress state ──► Failed (checkpoint flushed first)
//! Scanning ──► Interrupted on shutdown (checkpoint flushed first)
//! ```
//!
//! A block is either applied completely or not at all: its transactions are
//! fetched before the ledger is touched, and the checkpoint height only moves
//! after the whole block is applied.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{CheckpointManager, CheckpointStore};
use crate::error::ScanError;
use crate::ledger::BalanceLedger;
use crate::profile::{profile_for_endpoint, resolve_profile, ProfileOverrides, ScanMode, ScannerProfile};
use crate::snapshot::{RichListSnapshot, SnapshotStore};
use crate::source::IndexerSource;
use crate::types::{BlockPayload, Transaction, SUBUNITS_PER_COIN};

/// Engine settings that are not part of the pacing profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Rich-list inclusion threshold, in subunits.
    pub min_balance: i64,
    /// Explicit profile fields; survive endpoint changes.
    pub overrides: ProfileOverrides,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_balance: SUBUNITS_PER_COIN,
            overrides: ProfileOverrides::default(),
        }
    }
}

/// Where the engine currently is in a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ScanState {
    Idle,
    LoadingCheckpoint,
    FetchingTargetHeight,
    Scanning { height: u64 },
    Checkpointing { height: u64 },
    EmittingSnapshot,
    /// The last pass failed; cleared when the next pass starts.
    Failed,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::LoadingCheckpoint => write!(f, "loading-checkpoint"),
            Self::FetchingTargetHeight => write!(f, "fetching-target-height"),
            Self::Scanning { height } => write!(f, "scanning({height})"),
            Self::Checkpointing { height } => write!(f, "checkpointing({height})"),
            Self::EmittingSnapshot => write!(f, "emitting-snapshot"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Summary of a pass that scanned new blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// Checkpoint height the pass resumed from.
    pub from_height: u64,
    /// Height the ledger and snapshot now reflect.
    pub to_height: u64,
    pub blocks: u64,
    pub transactions: u64,
    /// Addresses in the ledger after the pass.
    pub addresses: u64,
    /// Addresses published in the rich list.
    pub listed_addresses: u64,
    pub total_supply: f64,
    pub elapsed_ms: u64,
}

/// Result of one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ScanOutcome {
    /// Nothing new on chain; nothing was written.
    UpToDate { height: u64 },
    /// Nothing new on chain, but the published snapshot was missing,
    /// unreadable or behind the checkpoint and has been rebuilt from it.
    SnapshotRegenerated { height: u64 },
    /// New blocks were applied and a new snapshot was published.
    Completed(ScanReport),
    /// Shutdown was requested mid-pass. Progress up to `height` is
    /// checkpointed; no snapshot was published.
    Interrupted { height: u64 },
}

struct EngineCore {
    source: Arc<dyn IndexerSource>,
    profile: ScannerProfile,
    overrides: ProfileOverrides,
    checkpoint: CheckpointManager,
    snapshots: Arc<dyn SnapshotStore>,
    min_balance: i64,
}

/// The balance scanner. One pass runs at a time; concurrent callers of
/// [`ScanEngine::run_pass`] queue behind the active pass.
///
/// Cancelling the shutdown token stops a running pass at the next block
/// boundary (or mid-fetch, mid-throttle) after flushing the checkpoint.
pub struct ScanEngine {
    core: Mutex<EngineCore>,
    state: RwLock<ScanState>,
    profile: RwLock<ScannerProfile>,
    shutdown: CancellationToken,
}

impl ScanEngine {
    pub fn new(
        source: Arc<dyn IndexerSource>,
        checkpoints: Box<dyn CheckpointStore>,
        snapshots: Arc<dyn SnapshotStore>,
        config: ScanConfig,
    ) -> Self {
        let profile = profile_for_endpoint(source.endpoint(), &config.overrides);
        source.configure(&profile);
        tracing::info!(
            endpoint = source.endpoint(),
            mode = %profile.mode,
            batch_size = profile.batch_size,
            checkpoint_interval = profile.checkpoint_interval,
            "Scanner profile selected"
        );
        Self {
            core: Mutex::new(EngineCore {
                checkpoint: CheckpointManager::new(checkpoints, profile.checkpoint_interval),
                source,
                profile,
                overrides: config.overrides,
                snapshots,
                min_balance: config.min_balance,
            }),
            state: RwLock::new(ScanState::Idle),
            profile: RwLock::new(profile),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop passes when `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Current state; readable while a pass is running.
    pub fn state(&self) -> ScanState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// The active pacing profile.
    pub fn profile(&self) -> ScannerProfile {
        *self.profile.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Endpoint of the active indexer source.
    pub async fn endpoint(&self) -> String {
        self.core.lock().await.source.endpoint().to_string()
    }

    /// Switch to another named profile, keeping configured overrides.
    /// Waits for a running pass to finish.
    pub async fn update_profile(&self, mode: ScanMode) -> ScannerProfile {
        let mut core = self.core.lock().await;
        let profile = resolve_profile(mode, &core.overrides);
        self.install_profile(&mut core, profile);
        profile
    }

    /// Replace the indexer source (e.g. after failover) and re-derive the
    /// profile from the new endpoint. Waits for a running pass to finish.
    pub async fn set_source(&self, source: Arc<dyn IndexerSource>) -> ScannerProfile {
        let mut core = self.core.lock().await;
        let profile = profile_for_endpoint(source.endpoint(), &core.overrides);
        tracing::info!(endpoint = source.endpoint(), mode = %profile.mode, "Indexer endpoint changed");
        core.source = source;
        self.install_profile(&mut core, profile);
        profile
    }

    fn install_profile(&self, core: &mut EngineCore, profile: ScannerProfile) {
        core.source.configure(&profile);
        core.checkpoint.set_interval(profile.checkpoint_interval);
        core.profile = profile;
        *self.profile.write().unwrap_or_else(|e| e.into_inner()) = profile;
    }

    fn set_state(&self, state: ScanState) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Run one scan pass: resume from the checkpoint, apply every block up to
    /// the indexer's height, publish the rich list.
    pub async fn run_pass(&self) -> Result<ScanOutcome, ScanError> {
        let mut core = self.core.lock().await;
        let result = self.pass(&mut core).await;
        match &result {
            Ok(outcome) => {
                self.set_state(ScanState::Idle);
                tracing::debug!(?outcome, "Scan pass finished");
            }
            Err(e) => {
                self.set_state(ScanState::Failed);
                tracing::error!(error = %e, height = ?e.failed_height(), "Scan pass failed");
            }
        }
        result
    }

    async fn pass(&self, core: &mut EngineCore) -> Result<ScanOutcome, ScanError> {
        let started = Instant::now();
        let profile = core.profile;

        self.set_state(ScanState::LoadingCheckpoint);
        let (mut height, mut ledger) = core.checkpoint.load_or_default().await;

        self.set_state(ScanState::FetchingTargetHeight);
        let target = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            res = core.source.get_height() => Some(res?),
        };
        let Some(target) = target else {
            tracing::info!(height, "Shutdown requested before scanning");
            return Ok(ScanOutcome::Interrupted { height });
        };

        if target <= height {
            let published = match core.snapshots.load().await {
                Ok(snapshot) => snapshot.map(|s| s.last_block_height),
                Err(e) => {
                    tracing::warn!(error = %e, "Published snapshot unreadable");
                    None
                }
            };
            if published != Some(height) {
                self.set_state(ScanState::EmittingSnapshot);
                core.publish(&ledger, height).await?;
                tracing::info!(height, ?published, "Snapshot out of date, regenerated from checkpoint");
                return Ok(ScanOutcome::SnapshotRegenerated { height });
            }
            tracing::info!(height, target, "Ledger up to date, nothing to scan");
            return Ok(ScanOutcome::UpToDate { height });
        }

        let from = height;
        tracing::info!(
            from,
            target,
            mode = %profile.mode,
            batch_size = profile.batch_size,
            checkpoint_interval = profile.checkpoint_interval,
            "Starting scan"
        );

        let throttle = Duration::from_millis(profile.throttle_delay_ms);
        let mut blocks = 0u64;
        let mut transactions = 0u64;

        for next in from + 1..=target {
            if self.shutdown.is_cancelled() {
                self.set_state(ScanState::Checkpointing { height });
                return core.interrupt(height, &ledger).await;
            }
            self.set_state(ScanState::Scanning { height: next });

            let fetched = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                res = core.fetch_block(next) => Some(res),
            };
            let txs = match fetched {
                Some(Ok(txs)) => txs,
                Some(Err(e)) => return Err(core.fail(height, &ledger, next, e).await),
                None => {
                    self.set_state(ScanState::Checkpointing { height });
                    return core.interrupt(height, &ledger).await;
                }
            };
            transactions += ledger.apply_block(&txs) as u64;
            height = next;
            blocks += 1;

            if core.checkpoint.is_due() {
                self.set_state(ScanState::Checkpointing { height });
            }
            match core.checkpoint.maybe_save(height, &ledger).await {
                Ok(true) => tracing::info!(
                    height,
                    target,
                    addresses = ledger.len(),
                    "Checkpoint saved"
                ),
                Ok(false) => {}
                Err(e) => return Err(core.fail(height, &ledger, next, e).await),
            }

            if blocks % profile.batch_size == 0 && next < target {
                tracing::debug!(height, delay_ms = profile.throttle_delay_ms, "Batch complete, throttling");
                tokio::select! {
                    _ = tokio::time::sleep(throttle) => {}
                    _ = self.shutdown.cancelled() => {}
                }
            }
        }

        self.set_state(ScanState::EmittingSnapshot);
        core.checkpoint.force_save(height, &ledger).await?;
        let snapshot = core.publish(&ledger, height).await?;

        let report = ScanReport {
            from_height: from,
            to_height: height,
            blocks,
            transactions,
            addresses: ledger.len() as u64,
            listed_addresses: snapshot.addresses.len() as u64,
            total_supply: snapshot.total_supply,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            from = report.from_height,
            to = report.to_height,
            blocks = report.blocks,
            transactions = report.transactions,
            addresses = report.addresses,
            total_supply = report.total_supply,
            elapsed_ms = report.elapsed_ms,
            "Scan complete, rich list published"
        );
        Ok(ScanOutcome::Completed(report))
    }
}

impl EngineCore {
    /// Fetch a block and resolve its transaction set.
    async fn fetch_block(&self, height: u64) -> Result<Vec<Transaction>, ScanError> {
        let block = self.source.get_block(height).await?;
        if block.height != height {
            return Err(ScanError::Malformed(format!(
                "asked for block {height}, indexer returned {}",
                block.height
            )));
        }
        match block.payload {
            BlockPayload::InlineTxs(txs) => Ok(txs),
            BlockPayload::TxRefs(ids) => {
                let mut txs = Vec::with_capacity(ids.len());
                for txid in &ids {
                    txs.push(self.source.get_transaction(txid).await?);
                }
                Ok(txs)
            }
        }
    }

    /// Flush progress on shutdown.
    async fn interrupt(&mut self, height: u64, ledger: &BalanceLedger) -> Result<ScanOutcome, ScanError> {
        tracing::info!(height, addresses = ledger.len(), "Shutdown requested, flushing checkpoint");
        self.checkpoint.force_save(height, ledger).await?;
        Ok(ScanOutcome::Interrupted { height })
    }

    /// Flush progress (the ledger as of `applied_height`) and wrap the error
    /// as a failure at block `failed_height`.
    async fn fail(
        &mut self,
        applied_height: u64,
        ledger: &BalanceLedger,
        failed_height: u64,
        error: ScanError,
    ) -> ScanError {
        tracing::warn!(failed_height, applied_height, error = %error, "Block failed, flushing checkpoint");
        if let Err(e) = self.checkpoint.force_save(applied_height, ledger).await {
            tracing::error!(applied_height, error = %e, "Could not persist checkpoint after failure");
        }
        ScanError::Block {
            height: failed_height,
            source: Box::new(error),
        }
    }

    async fn publish(&self, ledger: &BalanceLedger, height: u64) -> Result<RichListSnapshot, ScanError> {
        let snapshot = RichListSnapshot::build(ledger, height, self.min_balance, chrono::Utc::now());
        self.snapshots.save(&snapshot).await?;
        Ok(snapshot)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{JsonFileCheckpointStore, MemoryCheckpointStore};
    use crate::snapshot::{JsonFileSnapshotStore, MemorySnapshotStore};
    use crate::source::MemorySource;
    use crate::types::{TxInput, TxOutput};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    const COIN: i64 = SUBUNITS_PER_COIN;

    fn coinbase(id: &str, to: &str, amount: i64) -> Transaction {
        Transaction {
            txid: id.into(),
            inputs: vec![TxInput::generation()],
            outputs: vec![TxOutput::pay(to, amount)],
        }
    }

    fn transfer(id: &str, from: &str, spent: i64, to: &str, paid: i64) -> Transaction {
        Transaction {
            txid: id.into(),
            inputs: vec![TxInput::spend(from, spent)],
            outputs: vec![TxOutput::pay(to, paid)],
        }
    }

    /// Five blocks: A mined twice, C mined, A → B transfer, an empty message.
    fn chain() -> Arc<MemorySource> {
        let src = Arc::new(MemorySource::default());
        src.push_inline(1, vec![coinbase("c1", "A", 10 * COIN)]);
        src.push_inline(2, vec![coinbase("c2", "C", 5 * COIN)]);
        src.push_refs(3, vec![coinbase("c3", "A", 10 * COIN)]);
        src.push_inline(4, vec![transfer("t1", "A", 20 * COIN, "B", 17 * COIN)]);
        src.push_inline(
            5,
            vec![
                coinbase("c5", "D", COIN / 2),
                Transaction {
                    txid: "msg".into(),
                    inputs: vec![],
                    outputs: vec![],
                },
            ],
        );
        src
    }

    fn fast() -> ScanConfig {
        ScanConfig {
            min_balance: COIN,
            overrides: ProfileOverrides {
                throttle_delay_ms: Some(1),
                ..Default::default()
            },
        }
    }

    fn engine_with(
        src: Arc<MemorySource>,
        checkpoints: Arc<MemoryCheckpointStore>,
        snapshots: Arc<MemorySnapshotStore>,
        config: ScanConfig,
    ) -> ScanEngine {
        ScanEngine::new(src, Box::new(checkpoints), snapshots, config)
    }

    #[tokio::test]
    async fn full_scan_from_genesis() {
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let snapshots = Arc::new(MemorySnapshotStore::new());
        let engine = engine_with(chain(), checkpoints.clone(), snapshots.clone(), fast());

        let outcome = engine.run_pass().await.unwrap();
        let ScanOutcome::Completed(report) = outcome else {
            panic!("expected a completed pass, got {outcome:?}");
        };
        assert_eq!(report.from_height, 0);
        assert_eq!(report.to_height, 5);
        assert_eq!(report.blocks, 5);
        assert_eq!(report.transactions, 6);
        assert_eq!(report.addresses, 3); // B, C, D
        assert_eq!(engine.state(), ScanState::Idle);

        let snap = snapshots.load().await.unwrap().unwrap();
        assert_eq!(snap.last_block_height, 5);
        assert_eq!(snap.total_supply, 22.5);
        assert_eq!(snap.total_addresses, 3);
        // D holds 0.5 < threshold: excluded but part of the supply
        let listed: Vec<_> = snap.addresses.iter().map(|e| (e.rank, e.address.as_str())).collect();
        assert_eq!(listed, vec![(1, "B"), (2, "C")]);
        assert!((snap.addresses[0].percentage - 17.0 / 22.5 * 100.0).abs() < 1e-9);

        let cp = checkpoints.load().await.unwrap().unwrap();
        assert_eq!(cp.last_scanned_height, 5);
        assert!(!cp.balances.contains_key("A"));
    }

    #[tokio::test]
    async fn second_pass_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ScanEngine::new(
            chain(),
            Box::new(JsonFileCheckpointStore::in_dir(dir.path())),
            Arc::new(JsonFileSnapshotStore::in_dir(dir.path())),
            fast(),
        );

        assert!(matches!(engine.run_pass().await.unwrap(), ScanOutcome::Completed(_)));
        let cp_before = std::fs::read(dir.path().join("checkpoint.json")).unwrap();
        let snap_before = std::fs::read(dir.path().join("rich-list.json")).unwrap();

        assert_eq!(engine.run_pass().await.unwrap(), ScanOutcome::UpToDate { height: 5 });
        assert_eq!(std::fs::read(dir.path().join("checkpoint.json")).unwrap(), cp_before);
        assert_eq!(std::fs::read(dir.path().join("rich-list.json")).unwrap(), snap_before);
    }

    #[tokio::test]
    async fn failure_flushes_progress_and_resumes() {
        let src = chain();
        src.fail_at(4);
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let snapshots = Arc::new(MemorySnapshotStore::new());
        let engine = engine_with(src.clone(), checkpoints.clone(), snapshots.clone(), fast());

        let err = engine.run_pass().await.unwrap_err();
        assert_eq!(err.failed_height(), Some(4));
        assert!(err.is_transport());
        assert_eq!(engine.state(), ScanState::Failed);
        assert_eq!(checkpoints.load().await.unwrap().unwrap().last_scanned_height, 3);
        assert!(!snapshots.exists().await, "failed pass must not publish");

        src.heal(4);
        let ScanOutcome::Completed(report) = engine.run_pass().await.unwrap() else {
            panic!("expected completion after healing");
        };
        assert_eq!(report.from_height, 3);
        assert_eq!(src.block_fetches(), vec![1, 2, 3, 4, 4, 5]);

        let heights = checkpoints.saved_heights();
        assert!(heights.windows(2).all(|w| w[0] <= w[1]), "checkpoint rewound: {heights:?}");
    }

    #[tokio::test]
    async fn missing_block_is_never_skipped() {
        let src = Arc::new(MemorySource::default());
        src.push_inline(1, vec![coinbase("c1", "A", COIN)]);
        src.push_inline(3, vec![coinbase("c3", "B", COIN)]);
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let engine = engine_with(src, checkpoints.clone(), Arc::new(MemorySnapshotStore::new()), fast());

        let err = engine.run_pass().await.unwrap_err();
        assert_eq!(err.failed_height(), Some(2));
        assert_eq!(checkpoints.load().await.unwrap().unwrap().last_scanned_height, 1);
    }

    #[tokio::test]
    async fn checkpoint_cadence_follows_profile() {
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let mut config = fast();
        config.overrides.checkpoint_interval = Some(2);
        config.overrides.batch_size = Some(2);
        let engine = engine_with(chain(), checkpoints.clone(), Arc::new(MemorySnapshotStore::new()), config);

        engine.run_pass().await.unwrap();
        assert_eq!(checkpoints.saved_heights(), vec![2, 4, 5]);
    }

    #[tokio::test]
    async fn regenerates_missing_snapshot_when_caught_up() {
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let engine = engine_with(chain(), checkpoints.clone(), Arc::new(MemorySnapshotStore::new()), fast());
        engine.run_pass().await.unwrap();

        // a fresh snapshot location, same checkpoint
        let fresh = Arc::new(MemorySnapshotStore::new());
        let engine = engine_with(chain(), checkpoints.clone(), fresh.clone(), fast());
        assert_eq!(
            engine.run_pass().await.unwrap(),
            ScanOutcome::SnapshotRegenerated { height: 5 }
        );
        assert_eq!(fresh.load().await.unwrap().unwrap().last_block_height, 5);
        assert_eq!(checkpoints.saved_heights().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_passes_are_serialized() {
        let src = chain();
        let engine = engine_with(
            src.clone(),
            Arc::new(MemoryCheckpointStore::new()),
            Arc::new(MemorySnapshotStore::new()),
            fast(),
        );

        let (a, b) = tokio::join!(engine.run_pass(), engine.run_pass());
        let outcomes = [a.unwrap(), b.unwrap()];
        assert_eq!(
            outcomes.iter().filter(|o| matches!(o, ScanOutcome::Completed(_))).count(),
            1
        );
        assert!(outcomes.contains(&ScanOutcome::UpToDate { height: 5 }));
        assert_eq!(src.block_fetches(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn endpoint_change_reselects_profile() {
        let local = Arc::new(MemorySource::new("http://127.0.0.1:9130"));
        let mut config = fast();
        config.overrides.retry_limit = Some(7);
        let engine = engine_with(
            local.clone(),
            Arc::new(MemoryCheckpointStore::new()),
            Arc::new(MemorySnapshotStore::new()),
            config,
        );
        assert_eq!(engine.profile().mode, ScanMode::Aggressive);
        assert_eq!(local.configured_profile().unwrap().retry_limit, 7);

        let public = Arc::new(MemorySource::new("https://indexer.example.org"));
        let profile = engine.set_source(public.clone()).await;
        assert_eq!(profile.mode, ScanMode::Conservative);
        assert_eq!(profile.retry_limit, 7);
        assert_eq!(public.configured_profile(), Some(profile));
        assert_eq!(engine.endpoint().await, "https://indexer.example.org");

        let back = engine.update_profile(ScanMode::Aggressive).await;
        assert_eq!(engine.profile(), back);
        assert_eq!(back.batch_size, ScannerProfile::AGGRESSIVE.batch_size);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_mid_pass_flushes_progress() {
        let src = chain();
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let snapshots = Arc::new(MemorySnapshotStore::new());
        let mut config = fast();
        config.overrides.batch_size = Some(2);
        config.overrides.throttle_delay_ms = Some(60_000);
        let engine = engine_with(src.clone(), checkpoints.clone(), snapshots.clone(), config);
        let shutdown = engine.shutdown_token();

        // the pass is throttling after block 2 when shutdown arrives
        let (outcome, _) = tokio::join!(engine.run_pass(), async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            shutdown.cancel();
        });
        assert_eq!(outcome.unwrap(), ScanOutcome::Interrupted { height: 2 });
        assert_eq!(engine.state(), ScanState::Idle);
        assert_eq!(src.block_fetches(), vec![1, 2]);
        assert_eq!(checkpoints.saved_heights(), vec![2]);
        assert_eq!(checkpoints.load().await.unwrap().unwrap().last_scanned_height, 2);
        assert!(!snapshots.exists().await, "interrupted pass must not publish");

        let resumed = engine_with(src.clone(), checkpoints.clone(), snapshots.clone(), fast());
        let ScanOutcome::Completed(report) = resumed.run_pass().await.unwrap() else {
            panic!("expected the next pass to finish");
        };
        assert_eq!(report.from_height, 2);
        assert_eq!(src.block_fetches(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn shutdown_before_pass_writes_nothing() {
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let token = CancellationToken::new();
        token.cancel();
        let engine = engine_with(chain(), checkpoints.clone(), Arc::new(MemorySnapshotStore::new()), fast())
            .with_shutdown(token);

        assert_eq!(engine.run_pass().await.unwrap(), ScanOutcome::Interrupted { height: 0 });
        assert!(checkpoints.saved_heights().is_empty());
    }

    async fn throttled_duration(blocks: u64) -> Duration {
        let src = Arc::new(MemorySource::default());
        for h in 1..=blocks {
            src.push_inline(h, vec![coinbase(&format!("c{h}"), "A", COIN)]);
        }
        let mut config = fast();
        config.overrides.batch_size = Some(2);
        config.overrides.throttle_delay_ms = Some(1_000);
        let engine = engine_with(
            src,
            Arc::new(MemoryCheckpointStore::new()),
            Arc::new(MemorySnapshotStore::new()),
            config,
        );
        let started = tokio::time::Instant::now();
        engine.run_pass().await.unwrap();
        started.elapsed()
    }

    #[tokio::test(start_paused = true)]
    async fn throttles_between_batches() {
        // batches [1,2] [3,4] [5]: two pauses
        assert_eq!(throttled_duration(5).await, Duration::from_secs(2));
        // the last batch is never followed by a pause
        assert_eq!(throttled_duration(4).await, Duration::from_secs(1));
        assert_eq!(throttled_duration(2).await, Duration::ZERO);
    }

    /// Memory store whose next save can be made to fail.
    #[derive(Default)]
    struct FlakySnapshotStore {
        inner: MemorySnapshotStore,
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl SnapshotStore for FlakySnapshotStore {
        async fn load(&self) -> Result<Option<RichListSnapshot>, ScanError> {
            self.inner.load().await
        }

        async fn save(&self, snapshot: &RichListSnapshot) -> Result<(), ScanError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(ScanError::Storage("disk full".into()));
            }
            self.inner.save(snapshot).await
        }

        async fn exists(&self) -> bool {
            self.inner.exists().await
        }
    }

    #[tokio::test]
    async fn stale_snapshot_is_republished() {
        let src = Arc::new(MemorySource::default());
        src.push_inline(1, vec![coinbase("c1", "A", 2 * COIN)]);
        let snapshots = Arc::new(FlakySnapshotStore::default());
        let engine = ScanEngine::new(
            src.clone(),
            Box::new(MemoryCheckpointStore::new()),
            snapshots.clone(),
            fast(),
        );
        assert!(matches!(engine.run_pass().await.unwrap(), ScanOutcome::Completed(_)));

        // checkpoint reaches 2, publishing fails
        src.push_inline(2, vec![coinbase("c2", "B", 3 * COIN)]);
        snapshots.fail_next.store(true, Ordering::SeqCst);
        assert!(matches!(engine.run_pass().await, Err(ScanError::Storage(_))));
        assert_eq!(snapshots.load().await.unwrap().unwrap().last_block_height, 1);

        assert_eq!(
            engine.run_pass().await.unwrap(),
            ScanOutcome::SnapshotRegenerated { height: 2 }
        );
        let snap = snapshots.load().await.unwrap().unwrap();
        assert_eq!(snap.last_block_height, 2);
        assert_eq!(snap.total_addresses, 2);

        assert_eq!(engine.run_pass().await.unwrap(), ScanOutcome::UpToDate { height: 2 });
    }
}
