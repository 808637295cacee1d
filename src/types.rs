// Refund Audit Types
//
// Expected records loaded from the refund CSV and the decoded on-chain
// payloads they are reconciled against.

use crate::codec::{self, Asset, Name, PermissionLevel, Transaction};
use serde::{Deserialize, Serialize};

/// One expected refund row: `tx_id, address, quantity, token`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpectedRecord {
    /// Transaction that moved the funds off the compromised account
    pub tx_id: String,

    /// Destination EVM address (hex, any case, optional `0x`)
    pub address: String,

    /// Whole-token quantity as a base-10 string
    pub quantity: String,

    /// Token symbol code, e.g. `EOS`
    pub token: String,
}

impl ExpectedRecord {
    /// Address key used by both reconciliation passes
    pub fn address_key(&self) -> String {
        normalize_address(&self.address)
    }
}

/// Strip one leading `0x`/`0X` and lower-case the rest.
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex.to_ascii_lowercase()
}

/// `eosio.token::transfer` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedTransfer {
    pub from: Name,
    pub to: Name,
    pub quantity: Asset,
    pub memo: String,
}

/// `eosio.evm::admincall` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAdminCall {
    pub from: Vec<u8>,
    pub to: Vec<u8>,
    /// Big-endian unsigned amount in wei-like base units
    pub value: Vec<u8>,
    pub data: Vec<u8>,
    pub gas_limit: u64,
}

impl DecodedAdminCall {
    pub fn from_hex(&self) -> String {
        hex::encode(&self.from)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.to)
    }
}

/// `eosio.msig::approve` payload embedded in a Level-1 proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approval {
    pub proposer: Name,
    pub proposal_name: Name,
    pub level: PermissionLevel,
    pub proposal_hash: Option<[u8; 32]>,
}

/// Row of the `eosio.msig` `proposal` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalRecord {
    pub proposal_name: Name,
    pub packed_transaction: Vec<u8>,
}

impl ProposalRecord {
    pub fn transaction(&self) -> codec::Result<Transaction> {
        Transaction::unpack(&self.packed_transaction)
    }
}

/// How admin calls are packaged inside a Level-2 proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wrapping {
    /// Admin calls are the proposal's top-level actions
    #[default]
    Direct,
    /// Admin calls sit under `layers` nested `eosio.wrap::exec` envelopes
    PrivilegedExec { layers: u8 },
}

impl Wrapping {
    pub fn from_layers(layers: u8) -> Self {
        match layers {
            0 => Wrapping::Direct,
            layers => Wrapping::PrivilegedExec { layers },
        }
    }

    /// The wrapping left after removing one envelope.
    pub fn peel(self) -> Self {
        match self {
            Wrapping::Direct => Wrapping::Direct,
            Wrapping::PrivilegedExec { layers } => Wrapping::from_layers(layers.saturating_sub(1)),
        }
    }
}
