// Node RPC Client
//
// Reads multisig proposals from the `eosio.msig` `proposal` table through
// `/v1/chain/get_table_rows`.

use super::{LedgerError, Result};
use crate::actions::EOSIO_MSIG;
use crate::codec::{decode_hex, Name};
use crate::types::ProposalRecord;
use serde::{Deserialize, Serialize};
use tracing::debug;

const PROPOSAL_TABLE: &str = "proposal";

/// Rows fetched per lookup. The target is the first row at `lower_bound`
/// when it exists.
const ROW_LIMIT: u32 = 10;

#[derive(Debug, Serialize)]
struct GetTableRowsRequest {
    code: String,
    scope: String,
    table: &'static str,
    lower_bound: String,
    json: bool,
    limit: u32,
}

#[derive(Debug, Deserialize)]
pub struct GetTableRowsResponse<T> {
    pub rows: Vec<T>,
    #[serde(default)]
    pub more: bool,
}

/// JSON row of the `proposal` table
#[derive(Debug, Clone, Deserialize)]
pub struct ProposalRow {
    pub proposal_name: String,
    pub packed_transaction: String,
}

impl GetTableRowsResponse<ProposalRow> {
    /// Pick the row named `proposal` and decode its packed transaction hex.
    pub fn find_proposal(&self, proposal: Name) -> Result<Option<ProposalRecord>> {
        let wanted = proposal.to_string();
        let Some(row) = self.rows.iter().find(|row| row.proposal_name == wanted) else {
            return Ok(None);
        };

        Ok(Some(ProposalRecord {
            proposal_name: proposal,
            packed_transaction: decode_hex(&row.packed_transaction)?,
        }))
    }
}

pub struct ChainClient {
    http: reqwest::Client,
    endpoint: String,
}

impl ChainClient {
    pub fn new(http: reqwest::Client, endpoint: &str) -> Self {
        Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub async fn get_proposal(&self, proposer: Name, proposal: Name) -> Result<ProposalRecord> {
        let url = format!("{}/v1/chain/get_table_rows", self.endpoint);
        let request = GetTableRowsRequest {
            code: EOSIO_MSIG.to_string(),
            scope: proposer.to_string(),
            table: PROPOSAL_TABLE,
            lower_bound: proposal.to_string(),
            json: true,
            limit: ROW_LIMIT,
        };

        let response: GetTableRowsResponse<ProposalRow> = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LedgerError::from_reqwest(&url, e))?
            .json()
            .await
            .map_err(|e| LedgerError::from_reqwest(&url, e))?;

        debug!(%proposer, %proposal, rows = response.rows.len(), "fetched proposal rows");

        response
            .find_proposal(proposal)?
            .ok_or_else(|| LedgerError::NotFound(format!("proposal {proposer}/{proposal}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Transaction;

    #[test]
    fn finds_exact_proposal_row() {
        let packed = hex::encode(Transaction::default().pack());
        let data = format!(
            r#"{{
                "rows": [
                    {{"proposal_name": "faa2fc1f2ce3", "packed_transaction": "{packed}", "earliest_exec_time": null}},
                    {{"proposal_name": "faa2fc1f2ce4", "packed_transaction": ""}}
                ],
                "more": true,
                "next_key": "faa2fc1f2ce5"
            }}"#
        );

        let response: GetTableRowsResponse<ProposalRow> = serde_json::from_str(&data).unwrap();
        let record = response
            .find_proposal("faa2fc1f2ce3".parse().unwrap())
            .unwrap()
            .unwrap();

        assert_eq!(record.proposal_name.to_string(), "faa2fc1f2ce3");
        assert_eq!(record.transaction().unwrap(), Transaction::default());
    }

    #[test]
    fn lower_bound_neighbour_is_not_a_match() {
        let data = r#"{"rows": [{"proposal_name": "zzz", "packed_transaction": "00"}]}"#;
        let response: GetTableRowsResponse<ProposalRow> = serde_json::from_str(data).unwrap();
        assert!(response
            .find_proposal("aaa".parse().unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn bad_hex_is_a_decode_error() {
        let data = r#"{"rows": [{"proposal_name": "aaa", "packed_transaction": "xyz"}]}"#;
        let response: GetTableRowsResponse<ProposalRow> = serde_json::from_str(data).unwrap();
        assert!(matches!(
            response.find_proposal("aaa".parse().unwrap()),
            Err(LedgerError::Decode(_))
        ));
    }
}
