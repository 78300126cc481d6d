//! Balance ledger: the scanner's running address → (balance, tx count) map.
//!
//! Entries with a balance ≤ 0 are never kept. Every entry remembers when it
//! was (re)inserted so ties in the rich list can be broken by insertion order,
//! and an address that drops to zero and is funded again goes to the back of
//! that order with a fresh count.

use std::collections::{HashMap, HashSet};

use crate::types::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    balance: i64,
    tx_count: u64,
    seq: u64,
}

/// A read-only view of one ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Account<'a> {
    pub address: &'a str,
    /// Balance in subunits (always > 0).
    pub balance: i64,
    pub tx_count: u64,
}

/// In-memory ledger, mutated only by the scan engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceLedger {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

impl BalanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from `(address, balance, tx_count)` rows in insertion
    /// order. Rows with a non-positive balance are dropped.
    pub fn from_accounts<I, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = (S, i64, u64)>,
        S: Into<String>,
    {
        let mut ledger = Self::new();
        for (address, balance, tx_count) in rows {
            if balance <= 0 {
                continue;
            }
            let seq = ledger.bump_seq();
            ledger.entries.insert(
                address.into(),
                Entry {
                    balance,
                    tx_count,
                    seq,
                },
            );
        }
        ledger
    }

    /// Number of addresses currently holding a positive balance.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn balance(&self, address: &str) -> Option<i64> {
        self.entries.get(address).map(|e| e.balance)
    }

    pub fn tx_count(&self, address: &str) -> Option<u64> {
        self.entries.get(address).map(|e| e.tx_count)
    }

    /// Sum of all tracked balances, in subunits.
    pub fn total_supply(&self) -> i64 {
        self.entries
            .values()
            .fold(0i64, |acc, e| acc.saturating_add(e.balance))
    }

    /// All accounts in insertion order.
    pub fn accounts(&self) -> Vec<Account<'_>> {
        let mut rows: Vec<(&String, &Entry)> = self.entries.iter().collect();
        rows.sort_unstable_by_key(|(_, e)| e.seq);
        rows.into_iter()
            .map(|(address, e)| Account {
                address,
                balance: e.balance,
                tx_count: e.tx_count,
            })
            .collect()
    }

    /// Apply one transaction.
    ///
    /// Inputs debit the spent address, outputs credit the paid address.
    /// Generation inputs and address-less outputs move no tracked balance.
    /// Each address touched by the transaction is counted once: the output
    /// pass skips addresses already counted by the input pass. Addresses left
    /// at ≤ 0 are removed afterwards.
    ///
    /// Returns the number of addresses touched.
    pub fn apply_transaction(&mut self, tx: &Transaction) -> usize {
        let mut touched: Vec<String> = Vec::new();
        let mut counted: HashSet<String> = HashSet::new();

        for input in &tx.inputs {
            if input.is_generation {
                continue;
            }
            let Some(address) = input.address.as_deref() else {
                continue;
            };
            let amount = input.amount.unwrap_or(0);
            let entry = self.entry_mut(address);
            entry.balance = entry.balance.saturating_sub(amount);
            if counted.insert(address.to_string()) {
                entry.tx_count += 1;
                touched.push(address.to_string());
            }
        }

        for output in &tx.outputs {
            let Some(address) = output.address.as_deref() else {
                continue;
            };
            let entry = self.entry_mut(address);
            entry.balance = entry.balance.saturating_add(output.amount);
            if counted.insert(address.to_string()) {
                entry.tx_count += 1;
                touched.push(address.to_string());
            }
        }

        for address in &touched {
            if self.entries.get(address).is_some_and(|e| e.balance <= 0) {
                self.entries.remove(address);
            }
        }

        touched.len()
    }

    /// Apply every transaction of a block in order. Returns the number of
    /// transactions processed, including ledger no-ops.
    pub fn apply_block(&mut self, txs: &[Transaction]) -> usize {
        for tx in txs {
            self.apply_transaction(tx);
        }
        txs.len()
    }

    fn entry_mut(&mut self, address: &str) -> &mut Entry {
        let next_seq = &mut self.next_seq;
        self.entries.entry(address.to_string()).or_insert_with(|| {
            let seq = *next_seq;
            *next_seq += 1;
            Entry {
                balance: 0,
                tx_count: 0,
                seq,
            }
        })
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
