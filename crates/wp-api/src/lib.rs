//! Typed calls to the wallet portal endpoints.
//!
//! Everything goes through [`PortalClient::request`], so bearer tokens,
//! refresh and error normalization are handled by `wp-session`.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};
use wp_session::{PortalClient, RequestError, RequestOptions};

pub mod endpoints {
    pub const LEDGER: &str = "/wallet-portal/ledger";
    pub const RECHARGE: &str = "/wallet-portal/recharge";
    pub const WITHDRAW: &str = "/wallet-portal/withdraw";
}

/// Default page size of the ledger endpoint
pub const DEFAULT_LEDGER_LIMIT: u32 = 20;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("Invalid request payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl ApiError {
    /// Text suitable for the portal's error banner
    pub fn user_message(&self) -> String {
        match self {
            Self::Request(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Amount-carrying body of recharge and withdraw calls
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WalletAction {
    pub amount: f64,
}

impl WalletAction {
    pub fn new(amount: f64) -> Self {
        Self { amount }
    }
}

#[derive(Debug, Clone)]
pub struct PortalApi {
    client: PortalClient,
}

impl PortalApi {
    pub fn new(client: PortalClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &PortalClient {
        &self.client
    }

    /// One page of wallet history, newest first
    #[instrument(skip(self))]
    pub async fn ledger(&self, skip: u32, limit: u32) -> Result<Value> {
        let options = RequestOptions::get()
            .query("skip", skip)
            .query("limit", limit);
        Ok(self.client.request(endpoints::LEDGER, options).await?)
    }

    /// Create a recharge link for `action.amount`
    #[instrument(skip(self))]
    pub async fn recharge(&self, action: &WalletAction) -> Result<Value> {
        debug!("Requesting recharge link");
        self.post(endpoints::RECHARGE, action).await
    }

    /// File a withdrawal request; the backend locks the balance
    #[instrument(skip(self))]
    pub async fn withdraw(&self, action: &WalletAction) -> Result<Value> {
        debug!("Requesting withdrawal");
        self.post(endpoints::WITHDRAW, action).await
    }

    async fn post(&self, path: &str, payload: &impl Serialize) -> Result<Value> {
        let body = serde_json::to_value(payload)?;
        Ok(self.client.post(path, body).await?)
    }
}
