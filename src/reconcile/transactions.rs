// Transaction Reconciliation
//
// For every transaction id in the CSV, the transfers from the compromised
// account to the bridge account must carry each expected destination address
// in their memo, with exactly the expected amount.

use super::quantity::{format_expected_asset, transfer_difference, transfer_matches};
use super::{key_records, AmountMismatch, PassReport, ReconcileError, Strictness};
use crate::codec::Name;
use crate::ledger::{LedgerQuery, RetryPolicy};
use crate::types::{normalize_address, DecodedTransfer, ExpectedRecord};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct TransactionPassConfig {
    /// Account the stolen funds were moved from
    pub compromised_account: Name,
    /// Account the funds were bridged through (`eosio.evm`)
    pub bridge_account: Name,
    pub strictness: Strictness,
    pub retry: RetryPolicy,
}

/// Result for one transaction id
#[derive(Debug, Clone, Serialize)]
pub struct TransactionReport {
    pub tx_id: String,
    pub matched: usize,
    pub unmatched_expected: Vec<ExpectedRecord>,
    pub mismatched: Vec<AmountMismatch>,
    /// Memos of relevant transfers with no pending record
    pub unexpected: Vec<String>,
    pub checked: bool,
}

/// Run the transaction pass over `records`.
///
/// A ledger error (after retries) aborts the whole pass.
pub async fn reconcile_transactions<L: LedgerQuery + ?Sized>(
    ledger: &L,
    records: &[ExpectedRecord],
    config: &TransactionPassConfig,
) -> Result<PassReport<TransactionReport>, ReconcileError> {
    let (keyed, duplicates) = key_records(records, |r| (r.tx_id.clone(), r.address_key()));

    let mut groups: BTreeMap<String, BTreeMap<String, ExpectedRecord>> = BTreeMap::new();
    for ((tx_id, address), record) in keyed {
        groups.entry(tx_id).or_default().insert(address, record);
    }

    info!(transactions = groups.len(), records = records.len(), "starting transaction pass");

    let mut report = PassReport::new();
    for (tx_id, pending) in groups {
        let transfers = config
            .retry
            .run(&format!("get transaction {tx_id}"), || {
                ledger.fetch_transaction_transfers(&tx_id)
            })
            .await
            .map_err(|e| ReconcileError::ledger(format!("get transaction {tx_id}"), e))?;

        let item = check_transaction(tx_id, pending, transfers, config);
        report.matched += item.matched;
        report.unmatched_expected.extend(item.unmatched_expected.iter().cloned());

        if item.checked {
            info!("{} -> checked", item.tx_id);
        } else {
            warn!("{} -> not checked", item.tx_id);
        }

        let stop = !item.checked && config.strictness == Strictness::FailFast;
        if stop {
            report.aborted = Some(format!("transaction {} not checked", item.tx_id));
        }
        report.items.push(item);
        if stop {
            break;
        }
    }

    report.unmatched_expected.extend(duplicates);
    report.valid = report.aborted.is_none()
        && report.unmatched_expected.is_empty()
        && report.items.iter().all(|item| item.checked);

    Ok(report)
}

fn check_transaction(
    tx_id: String,
    mut pending: BTreeMap<String, ExpectedRecord>,
    transfers: Vec<DecodedTransfer>,
    config: &TransactionPassConfig,
) -> TransactionReport {
    let mut matched = 0;
    let mut mismatched = Vec::new();
    let mut unexpected = Vec::new();

    for transfer in transfers {
        if transfer.from != config.compromised_account || transfer.to != config.bridge_account {
            continue;
        }

        let key = normalize_address(&transfer.memo);
        let Some(record) = pending.get(&key) else {
            // Stop at the first transfer we cannot account for
            warn!(tx_id = %tx_id, memo = %transfer.memo, quantity = %transfer.quantity, "{} invalid", transfer.memo);
            unexpected.push(transfer.memo);
            break;
        };

        if transfer_matches(record, &transfer.quantity) {
            pending.remove(&key);
            matched += 1;
        } else {
            warn!(
                tx_id = %tx_id,
                expected = %format_expected_asset(&record.quantity, &record.token),
                observed = %transfer.quantity,
                difference = ?transfer_difference(record, &transfer.quantity),
                "{} balance incorrect",
                transfer.memo
            );
            mismatched.push(AmountMismatch {
                address: record.address.clone(),
                expected: format_expected_asset(&record.quantity, &record.token),
                observed: transfer.quantity.to_string(),
            });
        }
    }

    let unmatched_expected: Vec<ExpectedRecord> = pending.into_values().collect();
    let checked = unmatched_expected.is_empty() && unexpected.is_empty();

    TransactionReport {
        tx_id,
        matched,
        unmatched_expected,
        mismatched,
        unexpected,
        checked,
    }
}
