// Audit Configuration
//
// Every identifier the audit depends on comes from a command-line flag or its
// environment variable, with defaults matching the incident being audited.
// The resulting `AuditConfig` is passed explicitly to each pass.

use crate::codec::Name;
use crate::ledger::RetryPolicy;
use crate::reconcile::{ProposalPassConfig, Strictness, TransactionPassConfig};
use crate::types::{normalize_address, Wrapping};
use clap::{Parser, ValueEnum};
use eyre::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PassSelection {
    /// Only check the original transfers out of the compromised account
    Transactions,
    /// Only check the refund multisig proposal
    Proposal,
    /// Run both passes
    All,
}

impl PassSelection {
    pub fn transactions(self) -> bool {
        matches!(self, PassSelection::Transactions | PassSelection::All)
    }

    pub fn proposal(self) -> bool {
        matches!(self, PassSelection::Proposal | PassSelection::All)
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "refund-audit")]
#[command(version, about)]
pub struct Options {
    /// CSV of expected refunds (`tx_id,address,quantity,token`).
    #[arg(long, env = "REFUND_RECORDS", default_value = "account.csv")]
    pub records: PathBuf,

    /// Which reconciliation passes to run.
    #[arg(long, env = "AUDIT_PASS", value_enum, default_value_t = PassSelection::All)]
    pub pass: PassSelection,

    /// Account the stolen funds were moved from.
    #[arg(long, env = "COMPROMISED_ACCOUNT", default_value = "nrwgthbeupex")]
    pub compromised_account: Name,

    /// Account the stolen funds were bridged through.
    #[arg(long, env = "BRIDGE_ACCOUNT", default_value = "eosio.evm")]
    pub bridge_account: Name,

    /// Account that proposed the refund multisig proposals.
    #[arg(long, env = "PROPOSER", default_value = "smhgshaoahnf")]
    pub proposer: Name,

    /// Level-1 proposal name.
    #[arg(long, env = "PROPOSAL_NAME", default_value = "faa2fc1f2ce3")]
    pub proposal: Name,

    /// EVM address the admin calls must pay into.
    #[arg(
        long,
        env = "RECOVERY_EVM_ADDRESS",
        default_value = "bbbbbbbbbbbbbbbbbbbbbbbb55300ba914daae00"
    )]
    pub recovery_address: String,

    /// Number of privileged `exec` envelopes around Level-2 admin calls.
    #[arg(long, env = "PRIVILEGED_LAYERS", default_value_t = 0)]
    pub privileged_layers: u8,

    /// Only follow Level-1 approvals granted at this actor.
    #[arg(long, env = "APPROVAL_ACTOR")]
    pub approval_actor: Option<Name>,

    /// Node RPC endpoint used for multisig proposal lookups.
    #[arg(long, env = "NODE_ENDPOINT", default_value = "https://eos.greymass.com")]
    pub node_endpoint: String,

    /// Indexing API endpoint used for transaction lookups.
    #[arg(
        long,
        env = "INDEXER_ENDPOINT",
        default_value = "https://eos.dfuse.eosnation.io"
    )]
    pub indexer_endpoint: String,

    /// Token issuance endpoint for the indexing API.
    #[arg(
        long,
        env = "INDEXER_AUTH_URL",
        default_value = "https://auth.eosnation.io/v1/auth/issue"
    )]
    pub indexer_auth_url: String,

    /// Indexing API key. Required for the transaction pass.
    #[arg(long, env = "DFUSE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// HTTP request timeout in seconds.
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Attempts per ledger fetch (transient failures only).
    #[arg(long, env = "RETRY_ATTEMPTS", default_value_t = 3)]
    pub retry_attempts: u32,

    /// Linear backoff step between attempts, in milliseconds.
    #[arg(long, env = "RETRY_DELAY_MS", default_value_t = 2000)]
    pub retry_delay_ms: u64,

    /// Failure handling for the transaction pass.
    #[arg(long, env = "TRANSACTION_STRICTNESS", value_enum, default_value_t = Strictness::PerItem)]
    pub transaction_strictness: Strictness,

    /// Failure handling for the proposal pass.
    #[arg(long, env = "PROPOSAL_STRICTNESS", value_enum, default_value_t = Strictness::FailFast)]
    pub proposal_strictness: Strictness,

    /// Print the full reports as JSON after the verdict lines.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub node: String,
    pub indexer: String,
    pub indexer_auth: String,
    pub api_key: Option<String>,
    pub http_timeout: Duration,
}

/// Fully resolved configuration handed to the passes
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub records_path: PathBuf,
    pub pass: PassSelection,
    pub transactions: TransactionPassConfig,
    pub proposal: ProposalPassConfig,
    pub endpoints: Endpoints,
    pub json: bool,
}

impl Options {
    pub fn into_config(self) -> Result<AuditConfig> {
        let recovery_address = normalize_address(&self.recovery_address);
        if recovery_address.len() != 40 || hex::decode(&recovery_address).is_err() {
            bail!(
                "invalid recovery EVM address {:?}: expected 20 hex-encoded bytes",
                self.recovery_address
            );
        }

        let api_key = self.api_key.filter(|key| !key.trim().is_empty());
        if self.pass.transactions() && api_key.is_none() {
            bail!("the transaction pass needs an indexer API key (--api-key or DFUSE_API_KEY)");
        }

        let retry = RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_delay_ms),
        };

        Ok(AuditConfig {
            records_path: self.records,
            pass: self.pass,
            transactions: TransactionPassConfig {
                compromised_account: self.compromised_account,
                bridge_account: self.bridge_account,
                strictness: self.transaction_strictness,
                retry,
            },
            proposal: ProposalPassConfig {
                proposer: self.proposer,
                proposal: self.proposal,
                recovery_address,
                wrapping: Wrapping::from_layers(self.privileged_layers),
                approval_actor: self.approval_actor,
                strictness: self.proposal_strictness,
                retry,
            },
            endpoints: Endpoints {
                node: self.node_endpoint,
                indexer: self.indexer_endpoint,
                indexer_auth: self.indexer_auth_url,
                api_key,
                http_timeout: Duration::from_secs(self.http_timeout_secs),
            },
            json: self.json,
        })
    }
}
