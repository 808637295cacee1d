//! Reconciliation engine.
//!
//! Two independent passes match the expected refund records against what is
//! on chain:
//!
//! - [`transactions::reconcile_transactions`] checks the original transfers
//!   out of the compromised account, grouped by transaction id.
//! - [`proposal::reconcile_proposal`] checks the admin calls queued in the
//!   refund multisig proposal tree.
//!
//! Each pass consumes every expected record at most once and produces a
//! [`PassReport`] with a diagnostic trail and a verdict. Ledger failures that
//! survive the retry policy abort the pass with a [`ReconcileError`].

pub mod proposal;
pub mod quantity;
pub mod transactions;

use crate::ledger::LedgerError;
use crate::types::ExpectedRecord;
use serde::Serialize;
use std::collections::btree_map::{BTreeMap, Entry};
use thiserror::Error;
use tracing::warn;

pub use proposal::{reconcile_proposal, ProposalPassConfig, ProposalReport, RejectReason, RejectedCall};
pub use transactions::{reconcile_transactions, TransactionPassConfig, TransactionReport};

/// What a pass does on the first failing item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Strictness {
    /// Record the failure and keep checking the remaining items
    PerItem,
    /// Stop the pass at the first failure
    FailFast,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to {context}")]
    Ledger {
        context: String,
        #[source]
        source: LedgerError,
    },
}

impl ReconcileError {
    pub(crate) fn ledger(context: impl Into<String>, source: LedgerError) -> Self {
        ReconcileError::Ledger {
            context: context.into(),
            source,
        }
    }
}

/// Expected vs observed amount for a record that was found but not accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmountMismatch {
    pub address: String,
    pub expected: String,
    pub observed: String,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Serialize)]
pub struct PassReport<T> {
    /// Per transaction / per sub-proposal results, in processing order
    pub items: Vec<T>,
    /// Records matched across all items
    pub matched: usize,
    /// Records never consumed (including duplicates that could not be keyed)
    pub unmatched_expected: Vec<ExpectedRecord>,
    /// Set when a fail-fast pass stopped early
    pub aborted: Option<String>,
    pub valid: bool,
}

impl<T> PassReport<T> {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            matched: 0,
            unmatched_expected: Vec::new(),
            aborted: None,
            valid: false,
        }
    }
}

/// Group records by `key`, keeping the first record per key.
///
/// Later records with an existing key are returned separately: they can never
/// be consumed, so callers count them as unmatched.
fn key_records<K, F>(
    records: &[ExpectedRecord],
    mut key: F,
) -> (BTreeMap<K, ExpectedRecord>, Vec<ExpectedRecord>)
where
    K: Ord,
    F: FnMut(&ExpectedRecord) -> K,
{
    let mut keyed = BTreeMap::new();
    let mut duplicates = Vec::new();

    for record in records {
        match keyed.entry(key(record)) {
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
            }
            Entry::Occupied(_) => {
                warn!(
                    tx_id = %record.tx_id,
                    address = %record.address,
                    "duplicate expected record"
                );
                duplicates.push(record.clone());
            }
        }
    }

    (keyed, duplicates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tx_id: &str, address: &str) -> ExpectedRecord {
        ExpectedRecord {
            tx_id: tx_id.into(),
            address: address.into(),
            quantity: "1".into(),
            token: "EOS".into(),
        }
    }

    #[test]
    fn key_records_keeps_first_and_reports_duplicates() {
        let records = vec![
            record("a", "0xAB"),
            record("a", "ab"),
            record("b", "0xcd"),
        ];
        let (keyed, duplicates) = key_records(&records, |r| r.address_key());

        assert_eq!(keyed.len(), 2);
        assert_eq!(keyed["ab"].address, "0xAB");
        assert_eq!(duplicates, vec![record("a", "ab")]);
    }
}
