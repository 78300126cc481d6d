//! Fluent builder API for creating scan engines.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use richscan_core::{MemorySource, ScanEngineBuilder, ScanMode};
//!
//! let engine = ScanEngineBuilder::new(Arc::new(MemorySource::default()))
//!     .data_dir("./data")
//!     .min_balance(1.0)
//!     .mode(ScanMode::Conservative)
//!     .batch_size(50)
//!     .build();
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::checkpoint::{CheckpointStore, JsonFileCheckpointStore};
use crate::engine::{ScanConfig, ScanEngine};
use crate::profile::{ProfileOverrides, ScanMode};
use crate::snapshot::{JsonFileSnapshotStore, SnapshotStore};
use crate::source::IndexerSource;
use crate::types::from_coins;

/// Fluent builder for `ScanEngine`.
pub struct ScanEngineBuilder {
    source: Arc<dyn IndexerSource>,
    data_dir: PathBuf,
    checkpoints: Option<Box<dyn CheckpointStore>>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    config: ScanConfig,
    shutdown: Option<CancellationToken>,
}

impl ScanEngineBuilder {
    pub fn new(source: Arc<dyn IndexerSource>) -> Self {
        Self {
            source,
            data_dir: PathBuf::from("./data"),
            checkpoints: None,
            snapshots: None,
            config: ScanConfig::default(),
            shutdown: None,
        }
    }

    /// Directory holding `checkpoint.json` and `rich-list.json`.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Use a custom checkpoint store instead of the data directory.
    pub fn checkpoint_store(mut self, store: Box<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Use a custom snapshot store instead of the data directory.
    pub fn snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    /// Rich-list inclusion threshold, in coins.
    pub fn min_balance(mut self, coins: f64) -> Self {
        self.config.min_balance = from_coins(coins);
        self
    }

    /// Replace all profile overrides at once.
    pub fn overrides(mut self, overrides: ProfileOverrides) -> Self {
        self.config.overrides = overrides;
        self
    }

    /// Force a profile instead of classifying the endpoint.
    pub fn mode(mut self, mode: ScanMode) -> Self {
        self.config.overrides.mode = Some(mode);
        self
    }

    /// Blocks between throttle pauses.
    pub fn batch_size(mut self, blocks: u64) -> Self {
        self.config.overrides.batch_size = Some(blocks);
        self
    }

    /// Blocks between checkpoint writes.
    pub fn checkpoint_interval(mut self, blocks: u64) -> Self {
        self.config.overrides.checkpoint_interval = Some(blocks);
        self
    }

    pub fn throttle_delay_ms(mut self, ms: u64) -> Self {
        self.config.overrides.throttle_delay_ms = Some(ms);
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.overrides.timeout_ms = Some(ms);
        self
    }

    pub fn retry_limit(mut self, retries: u32) -> Self {
        self.config.overrides.retry_limit = Some(retries);
        self
    }

    /// Stop running passes (after a checkpoint flush) when `token` is cancelled.
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub fn build(self) -> ScanEngine {
        let checkpoints = self
            .checkpoints
            .unwrap_or_else(|| Box::new(JsonFileCheckpointStore::in_dir(&self.data_dir)));
        let snapshots = self
            .snapshots
            .unwrap_or_else(|| Arc::new(JsonFileSnapshotStore::in_dir(&self.data_dir)));
        let engine = ScanEngine::new(self.source, checkpoints, snapshots, self.config);
        match self.shutdown {
            Some(token) => engine.with_shutdown(token),
            None => engine,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ScannerProfile;
    use crate::source::MemorySource;

    #[test]
    fn builder_defaults() {
        let engine = ScanEngineBuilder::new(Arc::new(MemorySource::new("https://indexer.example.com"))).build();
        assert_eq!(engine.profile(), ScannerProfile::CONSERVATIVE);
    }

    #[test]
    fn builder_custom() {
        let engine = ScanEngineBuilder::new(Arc::new(MemorySource::new("https://indexer.example.com")))
            .mode(ScanMode::Aggressive)
            .batch_size(64)
            .checkpoint_interval(32)
            .throttle_delay_ms(5)
            .timeout_ms(2_000)
            .retry_limit(1)
            .build();

        let p = engine.profile();
        assert_eq!(p.mode, ScanMode::Aggressive);
        assert_eq!(p.batch_size, 64);
        assert_eq!(p.checkpoint_interval, 32);
        assert_eq!(p.throttle_delay_ms, 5);
        assert_eq!(p.timeout_ms, 2_000);
        assert_eq!(p.retry_limit, 1);
    }
}
