// EOS Refund Audit Library
//
// Reconciles an expected-refund CSV against on-chain data: the original
// transfers out of the compromised account, and the admin calls queued in the
// refund multisig proposal tree.

pub mod actions;
pub mod codec;
pub mod config;
pub mod ledger;
pub mod reconcile;
pub mod records;
pub mod types;

// Re-export commonly used items for testing
pub use codec::{Action, Asset, BinaryReader, BinaryWriter, Name, PermissionLevel, Transaction};
pub use ledger::{LedgerError, LedgerQuery, RetryPolicy, RpcLedger};
pub use reconcile::{
    reconcile_proposal, reconcile_transactions, PassReport, ProposalPassConfig, ReconcileError,
    Strictness, TransactionPassConfig,
};
pub use records::{load_records, read_records, RecordError};
pub use types::{DecodedAdminCall, DecodedTransfer, ExpectedRecord, Wrapping};
