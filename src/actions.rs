// Action Decoders for Token Transfers, Multisig Approvals and EVM Admin Calls
//
// This module knows the contract/action pairs the audit cares about and turns
// packed action payloads into typed structs.

use crate::codec::{Action, BinaryReader, DecodeError, Name, Result, Transaction};
use crate::types::{Approval, DecodedAdminCall, DecodedTransfer, Wrapping};
use tracing::warn;

// ============================================================================
// CONTRACTS AND ACTIONS
// ============================================================================

pub const EOSIO_TOKEN: Name = Name(0x5530ea033482a600);
pub const EOSIO_MSIG: Name = Name(0x5530ea0258730000);
pub const EOSIO_EVM: Name = Name(0x5530ea015b900000);
pub const EOSIO_WRAP: Name = Name(0x5530ea0397354000);

pub const TRANSFER: Name = Name(0xcdcd3c2d57000000);
pub const APPROVE: Name = Name(0x356b7a6d40000000);
pub const ADMINCALL: Name = Name(0x3264e9a0d1880000);
pub const EXEC: Name = Name(0x5754800000000000);

fn expect_action(action: &Action, account: Name, name: Name, expected: &'static str) -> Result<()> {
    if action.is(account, name) {
        Ok(())
    } else {
        Err(DecodeError::UnexpectedAction {
            account: action.account,
            name: action.name,
            expected,
        })
    }
}

// ============================================================================
// TOKEN TRANSFERS
// ============================================================================

/// Decode an action as a token transfer. Returns None if it is not one.
///
/// A transfer whose payload does not decode is logged and skipped.
pub fn decode_transfer(action: &Action) -> Option<DecodedTransfer> {
    if !action.is(EOSIO_TOKEN, TRANSFER) {
        return None;
    }

    match decode_transfer_data(&action.data) {
        Ok(transfer) => Some(transfer),
        Err(e) => {
            warn!(error = %e, data = %hex::encode(&action.data), "skipping undecodable transfer");
            None
        }
    }
}

/// `transfer(name from, name to, asset quantity, string memo)`
pub fn decode_transfer_data(data: &[u8]) -> Result<DecodedTransfer> {
    let mut reader = BinaryReader::new(data);
    Ok(DecodedTransfer {
        from: reader.read_name()?,
        to: reader.read_name()?,
        quantity: reader.read_asset()?,
        memo: reader.read_string()?,
    })
}

// ============================================================================
// MULTISIG
// ============================================================================

/// `approve(name proposer, name proposal_name, permission_level level,
/// binary_extension<checksum256> proposal_hash)`
pub fn decode_approval(action: &Action) -> Result<Approval> {
    expect_action(action, EOSIO_MSIG, APPROVE, "eosio.msig::approve")?;

    let mut reader = BinaryReader::new(&action.data);
    let proposer = reader.read_name()?;
    let proposal_name = reader.read_name()?;
    let level = reader.read_permission_level()?;
    let proposal_hash = if reader.is_empty() {
        None
    } else {
        Some(reader.read_checksum256()?)
    };
    reader.finish("approve")?;

    Ok(Approval {
        proposer,
        proposal_name,
        level,
        proposal_hash,
    })
}

/// `exec(name executer, transaction trx)` on the privileged wrapper contract
pub fn decode_exec(action: &Action) -> Result<(Name, Transaction)> {
    expect_action(action, EOSIO_WRAP, EXEC, "eosio.wrap::exec")?;

    let mut reader = BinaryReader::new(&action.data);
    let executer = reader.read_name()?;
    let trx = reader.read_transaction()?;
    reader.finish("exec")?;
    Ok((executer, trx))
}

/// Peel `wrapping` envelopes off `actions`, recursing one layer at a time.
pub fn unwrap_actions(actions: Vec<Action>, wrapping: Wrapping) -> Result<Vec<Action>> {
    if wrapping == Wrapping::Direct {
        return Ok(actions);
    }

    let mut inner = Vec::new();
    for action in &actions {
        let (_executer, trx) = decode_exec(action)?;
        inner.extend(trx.actions);
    }
    unwrap_actions(inner, wrapping.peel())
}

// ============================================================================
// EVM BRIDGE
// ============================================================================

/// `admincall(bytes from, bytes to, bytes value, bytes data, uint64 gas_limit)`
pub fn decode_admin_call(action: &Action) -> Result<DecodedAdminCall> {
    expect_action(action, EOSIO_EVM, ADMINCALL, "eosio.evm::admincall")?;

    let mut reader = BinaryReader::new(&action.data);
    let call = DecodedAdminCall {
        from: reader.read_bytes()?,
        to: reader.read_bytes()?,
        value: reader.read_bytes()?,
        data: reader.read_bytes()?,
        gas_limit: reader.read_u64()?,
    };
    reader.finish("admincall")?;
    Ok(call)
}
