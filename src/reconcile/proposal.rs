// Proposal Reconciliation
//
// The Level-1 proposal approves a set of Level-2 proposals; each Level-2
// proposal carries `eosio.evm::admincall` actions that move funds from a
// victim's EVM address back to the recovery address. Every expected record
// must be covered by exactly one admin call with an acceptable amount.

use super::quantity::{scaled_evm_value, scaled_expected, within_gas_reserve};
use super::{key_records, AmountMismatch, PassReport, ReconcileError, Strictness};
use crate::codec::Name;
use crate::ledger::{LedgerQuery, RetryPolicy};
use crate::types::{normalize_address, DecodedAdminCall, ExpectedRecord, Wrapping};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ProposalPassConfig {
    /// Account that proposed the Level-1 proposal
    pub proposer: Name,
    /// Level-1 proposal name
    pub proposal: Name,
    /// EVM address every admin call must pay into (any case, optional `0x`)
    pub recovery_address: String,
    /// Envelopes around the admin calls in Level-2 proposals
    pub wrapping: Wrapping,
    /// Only follow approvals granted at this actor's permission
    pub approval_actor: Option<Name>,
    pub strictness: Strictness,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    /// `from` is not (or no longer) in the working set
    UnknownSender,
    /// `to` is not the recovery address
    WrongRecipient,
    /// `value` does not fit in 256 bits
    InvalidValue(String),
    /// Expected quantity is not an integer
    InvalidQuantity(String),
}

/// Admin call that could not be matched against a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedCall {
    pub from: String,
    pub to: String,
    pub reason: RejectReason,
}

/// Result for one Level-2 proposal
#[derive(Debug, Clone, Serialize)]
pub struct ProposalReport {
    pub proposal: Name,
    pub matched: usize,
    pub mismatched: Vec<AmountMismatch>,
    pub rejected: Vec<RejectedCall>,
}

impl ProposalReport {
    fn new(proposal: Name) -> Self {
        Self {
            proposal,
            matched: 0,
            mismatched: Vec::new(),
            rejected: Vec::new(),
        }
    }

    fn is_clean(&self) -> bool {
        self.mismatched.is_empty() && self.rejected.is_empty()
    }
}

/// Run the proposal pass over `records`.
///
/// Ledger errors on either level (after retries) abort the pass with an error.
pub async fn reconcile_proposal<L: LedgerQuery + ?Sized>(
    ledger: &L,
    records: &[ExpectedRecord],
    config: &ProposalPassConfig,
) -> Result<PassReport<ProposalReport>, ReconcileError> {
    let (mut working, duplicates) = key_records(records, ExpectedRecord::address_key);
    let recovery_address = normalize_address(&config.recovery_address);

    let (proposer, proposal) = (config.proposer, config.proposal);
    let approvals = config
        .retry
        .run(&format!("get level-1 proposal {proposal}"), || {
            ledger.fetch_approvals(proposer, proposal)
        })
        .await
        .map_err(|e| ReconcileError::ledger(format!("get level-1 proposal {proposer}/{proposal}"), e))?;

    info!(
        %proposer,
        %proposal,
        approvals = approvals.len(),
        records = working.len(),
        "starting proposal pass"
    );

    let mut report = PassReport::new();
    for approval in approvals {
        if let Some(actor) = config.approval_actor {
            if approval.level.actor != actor {
                info!(
                    proposal = %approval.proposal_name,
                    actor = %approval.level.actor,
                    "skipping approval at another actor"
                );
                continue;
            }
        }

        let sub = approval.proposal_name;
        let calls = config
            .retry
            .run(&format!("get level-2 proposal {sub}"), || {
                ledger.fetch_admin_actions(approval.proposer, sub, config.wrapping)
            })
            .await
            .map_err(|e| {
                ReconcileError::ledger(format!("get level-2 proposal {}/{sub}", approval.proposer), e)
            })?;

        let mut item = ProposalReport::new(sub);
        for call in &calls {
            match check_admin_call(call, &mut working, &recovery_address) {
                Ok(()) => {
                    item.matched += 1;
                    report.matched += 1;
                    info!("{} checked -> total {}", call.from_hex(), report.matched);
                }
                Err(CallFailure::Rejected(rejected)) => item.rejected.push(rejected),
                Err(CallFailure::Mismatch(mismatch)) => item.mismatched.push(mismatch),
            }

            if !item.is_clean() && config.strictness == Strictness::FailFast {
                report.aborted = Some(format!("proposal {sub}: admin call from {} failed", call.from_hex()));
                break;
            }
        }

        report.items.push(item);
        if report.aborted.is_some() {
            break;
        }
    }

    report.unmatched_expected = working.into_values().chain(duplicates).collect();
    report.valid = report.aborted.is_none()
        && report.unmatched_expected.is_empty()
        && report.items.iter().all(ProposalReport::is_clean);

    if !report.unmatched_expected.is_empty() {
        warn!(
            remaining = report.unmatched_expected.len(),
            "expected records without a matching admin call"
        );
    }

    Ok(report)
}

enum CallFailure {
    Rejected(RejectedCall),
    Mismatch(AmountMismatch),
}

/// Match one admin call, consuming its record from `working` on success.
fn check_admin_call(
    call: &DecodedAdminCall,
    working: &mut BTreeMap<String, ExpectedRecord>,
    recovery_address: &str,
) -> Result<(), CallFailure> {
    let from = call.from_hex();
    let to = call.to_hex();
    let reject = |reason: RejectReason| {
        CallFailure::Rejected(RejectedCall {
            from: from.clone(),
            to: to.clone(),
            reason,
        })
    };

    let Some(record) = working.get(&from) else {
        warn!("{} not found", from);
        return Err(reject(RejectReason::UnknownSender));
    };

    if to != recovery_address {
        warn!("{} receiver address incorrect", to);
        return Err(reject(RejectReason::WrongRecipient));
    }

    let observed = scaled_evm_value(&call.value).map_err(|e| {
        warn!(from = %from, error = %e, "invalid transfer value");
        reject(RejectReason::InvalidValue(e.to_string()))
    })?;

    let expected = scaled_expected(&record.quantity).map_err(|e| {
        warn!("{} balance error: {}", record.address, e);
        reject(RejectReason::InvalidQuantity(e.to_string()))
    })?;

    if !within_gas_reserve(expected, observed) {
        warn!(
            expected = %expected,
            observed = %observed,
            "{} incorrect transfer quantity",
            record.address
        );
        return Err(CallFailure::Mismatch(AmountMismatch {
            address: record.address.clone(),
            expected: expected.to_string(),
            observed: observed.to_string(),
        }));
    }

    working.remove(&from);
    Ok(())
}
