//! richscan-core: the incremental balance scanner behind the RichScan rich list.
//!
//! # Architecture
//!
//! ```text
//! ScanEngine ──► IndexerSource      (height, blocks, transactions)
//!     │
//!     ├── ScannerProfile            (aggressive / conservative pacing)
//!     ├── BalanceLedger             (address → balance, tx count)
//!     ├── CheckpointManager         (resumable ledger state)
//!     └── SnapshotStore             (ranked RichListSnapshot document)
//! ```

pub mod builder;
pub mod checkpoint;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod profile;
pub mod snapshot;
pub mod source;
pub mod storage;
pub mod types;

pub use builder::ScanEngineBuilder;
pub use checkpoint::{
    CheckpointManager, CheckpointStore, JsonFileCheckpointStore, MemoryCheckpointStore, ScanCheckpoint,
};
pub use engine::{ScanConfig, ScanEngine, ScanOutcome, ScanReport, ScanState};
pub use error::ScanError;
pub use ledger::BalanceLedger;
pub use profile::{
    classify, profile_for_endpoint, resolve_profile, EndpointClass, ProfileOverrides, ScanMode, ScannerProfile,
};
pub use snapshot::{
    JsonFileSnapshotStore, MemorySnapshotStore, RichListEntry, RichListPage, RichListSnapshot,
    SnapshotMetadata, SnapshotStore,
};
pub use source::{IndexerSource, MemorySource};
pub use types::{BlockPayload, IndexerBlock, Transaction, TxInput, TxOutput};
