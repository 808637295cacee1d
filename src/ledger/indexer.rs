// Indexing API Client
//
// Looks up transactions through a dfuse-style hosted indexer. Requests are
// authenticated with a short-lived bearer token issued from a static API key;
// the token is reused until shortly before it expires.

use super::{LedgerError, Result};
use crate::actions::decode_transfer;
use crate::codec::{decode_hex, Action, Name};
use crate::types::DecodedTransfer;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Refresh the token this long before the issuer's expiry.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    api_key: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    /// Unix seconds
    pub expires_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexedAuthorization {
    pub actor: String,
    pub permission: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexedAction {
    pub account: String,
    pub name: String,
    #[serde(default)]
    pub authorization: Vec<IndexedAuthorization>,
    #[serde(default)]
    pub hex_data: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexedTransaction {
    #[serde(default)]
    pub actions: Vec<IndexedAction>,
}

/// `/v0/transactions/{id}` response
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionResponse {
    #[serde(default)]
    pub transaction_status: String,
    #[serde(default)]
    pub id: String,
    pub transaction: Option<IndexedTransaction>,
}

impl TransactionResponse {
    /// Token transfers in the transaction. Actions that are not transfers or
    /// whose payload does not decode are skipped.
    pub fn transfers(&self) -> Vec<DecodedTransfer> {
        let Some(trx) = &self.transaction else {
            warn!(tx_id = %self.id, "indexer returned no transaction body");
            return Vec::new();
        };

        trx.actions
            .iter()
            .filter_map(|indexed| {
                let action = to_action(indexed)?;
                decode_transfer(&action)
            })
            .collect()
    }
}

fn to_action(indexed: &IndexedAction) -> Option<Action> {
    // Unparseable names cannot be eosio.token::transfer
    let account: Name = indexed.account.parse().ok()?;
    let name: Name = indexed.name.parse().ok()?;

    let data = match decode_hex(&indexed.hex_data) {
        Ok(data) => data,
        Err(e) => {
            warn!(account = %indexed.account, action = %indexed.name, error = %e, "skipping action with bad hex_data");
            return None;
        }
    };

    Some(Action {
        account,
        name,
        authorization: Vec::new(),
        data,
    })
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: i64,
}

pub struct IndexerClient {
    http: reqwest::Client,
    endpoint: String,
    auth_url: String,
    api_key: String,
    token: Mutex<Option<CachedToken>>,
}

impl IndexerClient {
    pub fn new(http: reqwest::Client, endpoint: &str, auth_url: &str, api_key: String) -> Self {
        Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            auth_url: auth_url.to_string(),
            api_key,
            token: Mutex::new(None),
        }
    }

    /// Issue a new bearer token from the API key.
    pub async fn issue_token(&self) -> Result<TokenResponse> {
        let url = self.auth_url.as_str();
        let response = self
            .http
            .post(url)
            .json(&TokenRequest {
                api_key: &self.api_key,
            })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LedgerError::from_reqwest(url, e))?;

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::from_reqwest(url, e))?;
        info!(expires_at = token.expires_at, "issued indexer API token");
        Ok(token)
    }

    async fn bearer_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        let now = unix_now();

        if let Some(token) = cached.as_ref() {
            if token.expires_at - TOKEN_EXPIRY_MARGIN_SECS > now {
                return Ok(token.token.clone());
            }
            debug!("indexer token expired, reissuing");
        }

        let issued = self.issue_token().await?;
        *cached = Some(CachedToken {
            token: issued.token.clone(),
            expires_at: issued.expires_at,
        });
        Ok(issued.token)
    }

    pub async fn get_transaction(&self, tx_id: &str) -> Result<TransactionResponse> {
        let token = self.bearer_token().await?;
        let url = format!("{}/v0/transactions/{}", self.endpoint, tx_id);

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| LedgerError::from_reqwest(&url, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(LedgerError::NotFound(format!("transaction {tx_id}")));
        }

        let response = response
            .error_for_status()
            .map_err(|e| LedgerError::from_reqwest(&url, e))?;

        response
            .json()
            .await
            .map_err(|e| LedgerError::from_reqwest(&url, e))
    }

    pub async fn transfers(&self, tx_id: &str) -> Result<Vec<DecodedTransfer>> {
        let response = self.get_transaction(tx_id).await?;
        let transfers = response.transfers();
        debug!(
            tx_id,
            status = %response.transaction_status,
            transfers = transfers.len(),
            "fetched transaction"
        );
        Ok(transfers)
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs() as i64
}
