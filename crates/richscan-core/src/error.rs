//! Error types for the scan pipeline.

use thiserror::Error;

/// Errors that can occur while scanning, persisting or serving ledger state.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The indexer could not be reached or kept failing after all retries.
    #[error("Indexer error: {0}")]
    Indexer(String),

    /// The indexer answered, but the payload could not be understood.
    #[error("Malformed indexer payload: {0}")]
    Malformed(String),

    /// The indexer does not know a block the engine needs.
    #[error("Block {height} not found on indexer")]
    BlockNotFound { height: u64 },

    /// Applying a block failed; progress up to `height - 1` was persisted.
    #[error("Scan failed at block {height}: {source}")]
    Block {
        height: u64,
        #[source]
        source: Box<ScanError>,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ScanError {
    /// Returns `true` if the failure came from the transport to the indexer,
    /// i.e. switching to another endpoint may help.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Indexer(_) => true,
            Self::Block { source, .. } => source.is_transport(),
            _ => false,
        }
    }

    /// The block height a per-block failure happened at, if any.
    pub fn failed_height(&self) -> Option<u64> {
        match self {
            Self::Block { height, .. } | Self::BlockNotFound { height } => Some(*height),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ScanError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_failure_inherits_transport_flag() {
        let err = ScanError::Block {
            height: 42,
            source: Box::new(ScanError::Indexer("HTTP 503".into())),
        };
        assert!(err.is_transport());
        assert_eq!(err.failed_height(), Some(42));

        let malformed = ScanError::Block {
            height: 7,
            source: Box::new(ScanError::Malformed("missing vout".into())),
        };
        assert!(!malformed.is_transport());
    }
}
