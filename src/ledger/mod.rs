//! Ledger query adapter.
//!
//! The reconciliation engine only sees the [`LedgerQuery`] trait. The
//! production implementation, [`RpcLedger`], combines the hosted indexing API
//! (transaction lookups) with a node's `get_table_rows` endpoint (multisig
//! proposals). Tests plug in an in-memory ledger instead.

pub mod chain;
pub mod indexer;
pub mod retry;

use crate::actions::{decode_admin_call, decode_approval, unwrap_actions};
use crate::codec::{DecodeError, Name};
use crate::types::{Approval, DecodedAdminCall, DecodedTransfer, ProposalRecord, Wrapping};
use async_trait::async_trait;
use chain::ChainClient;
use indexer::IndexerClient;
use thiserror::Error;
use tracing::{debug, warn};

pub use retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("ledger not configured: {0}")]
    NotConfigured(&'static str),
}

impl LedgerError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LedgerError::Network(_) => true,
            LedgerError::Http { status, .. } => *status == 429 || *status >= 500,
            LedgerError::InvalidResponse { .. }
            | LedgerError::Decode(_)
            | LedgerError::NotFound(_)
            | LedgerError::NotConfigured(_) => false,
        }
    }

    pub(crate) fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            LedgerError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            }
        } else if e.is_decode() {
            LedgerError::InvalidResponse {
                url: url.to_string(),
                reason: e.to_string(),
            }
        } else {
            LedgerError::Network(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Read-only view of the chain needed by the reconciliation passes.
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    /// Token transfers in a transaction. Other actions are skipped.
    async fn fetch_transaction_transfers(&self, tx_id: &str) -> Result<Vec<DecodedTransfer>>;

    /// Raw multisig proposal. Absence is [`LedgerError::NotFound`].
    async fn fetch_proposal(&self, proposer: Name, proposal: Name) -> Result<ProposalRecord>;

    /// Approvals embedded in a Level-1 proposal.
    ///
    /// The packed transaction must decode; individual actions that are not
    /// approvals are logged and skipped.
    async fn fetch_approvals(&self, proposer: Name, proposal: Name) -> Result<Vec<Approval>> {
        let record = self.fetch_proposal(proposer, proposal).await?;
        let trx = record.transaction()?;

        let mut approvals = Vec::with_capacity(trx.actions.len());
        for action in &trx.actions {
            match decode_approval(action) {
                Ok(approval) => approvals.push(approval),
                Err(e) => warn!(%proposer, %proposal, error = %e, "skipping non-approval action"),
            }
        }

        debug!(%proposer, %proposal, approvals = approvals.len(), "decoded level-1 proposal");
        Ok(approvals)
    }

    /// EVM admin calls in a Level-2 proposal, after peeling `wrapping`.
    ///
    /// Any action that is not an admin call is a decode error.
    async fn fetch_admin_actions(
        &self,
        proposer: Name,
        proposal: Name,
        wrapping: Wrapping,
    ) -> Result<Vec<DecodedAdminCall>> {
        let record = self.fetch_proposal(proposer, proposal).await?;
        let trx = record.transaction()?;

        let calls = unwrap_actions(trx.actions, wrapping)?
            .iter()
            .map(decode_admin_call)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!(%proposer, %proposal, calls = calls.len(), "decoded level-2 proposal");
        Ok(calls)
    }
}

/// Indexer + node RPC ledger
pub struct RpcLedger {
    indexer: Option<IndexerClient>,
    chain: ChainClient,
}

impl RpcLedger {
    pub fn new(indexer: Option<IndexerClient>, chain: ChainClient) -> Self {
        Self { indexer, chain }
    }
}

#[async_trait]
impl LedgerQuery for RpcLedger {
    async fn fetch_transaction_transfers(&self, tx_id: &str) -> Result<Vec<DecodedTransfer>> {
        let indexer = self
            .indexer
            .as_ref()
            .ok_or(LedgerError::NotConfigured("indexer API key is not set"))?;
        indexer.transfers(tx_id).await
    }

    async fn fetch_proposal(&self, proposer: Name, proposal: Name) -> Result<ProposalRecord> {
        self.chain.get_proposal(proposer, proposal).await
    }
}
