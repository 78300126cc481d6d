//! Shared types for the scan pipeline.
//!
//! Amounts are carried in indexer-native integer subunits everywhere inside
//! the engine; conversion to the decimal coin unit happens only when a
//! document meant for humans (checkpoint supply, rich list) is produced.

use serde::{Deserialize, Serialize};

/// Number of indexer subunits in one coin.
pub const SUBUNITS_PER_COIN: i64 = 100_000_000;

/// Convert integer subunits to the decimal coin unit.
pub fn to_coins(subunits: i64) -> f64 {
    subunits as f64 / SUBUNITS_PER_COIN as f64
}

/// Convert a decimal coin amount to integer subunits (rounded to the nearest
/// subunit).
pub fn from_coins(coins: f64) -> i64 {
    (coins * SUBUNITS_PER_COIN as f64).round() as i64
}

// ─── Transactions ─────────────────────────────────────────────────────────────

/// A transaction input as reported by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Address whose prior output this input spends.
    pub address: Option<String>,
    /// Amount spent, in subunits.
    pub amount: Option<i64>,
    /// Coinbase / generation input (creates supply, has no address).
    pub is_generation: bool,
}

impl TxInput {
    /// A regular input spending `amount` subunits from `address`.
    pub fn spend(address: impl Into<String>, amount: i64) -> Self {
        Self {
            address: Some(address.into()),
            amount: Some(amount),
            is_generation: false,
        }
    }

    /// A generation (coinbase) input.
    pub fn generation() -> Self {
        Self {
            address: None,
            amount: None,
            is_generation: true,
        }
    }
}

/// A transaction output as reported by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Paid address; `None` for non-standard / data outputs.
    pub address: Option<String>,
    /// Amount paid, in subunits.
    pub amount: i64,
}

impl TxOutput {
    pub fn pay(address: impl Into<String>, amount: i64) -> Self {
        Self {
            address: Some(address.into()),
            amount,
        }
    }
}

/// A fully resolved transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: String,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Returns `true` for non-monetary messages (no inputs, no outputs).
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }
}

// ─── Blocks ───────────────────────────────────────────────────────────────────

/// How the indexer delivered a block's transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockPayload {
    /// Full transactions are embedded in the block response.
    InlineTxs(Vec<Transaction>),
    /// Only transaction ids are listed; each needs a follow-up fetch.
    TxRefs(Vec<String>),
}

impl BlockPayload {
    pub fn len(&self) -> usize {
        match self {
            Self::InlineTxs(txs) => txs.len(),
            Self::TxRefs(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A block as returned by the indexer, before transaction references are
/// resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerBlock {
    pub height: u64,
    pub hash: String,
    pub payload: BlockPayload,
}

// ─── Tests ────────────────────────────────────────────────────────────────────
