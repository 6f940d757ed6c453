use std::collections::HashMap;

use thiserror::Error;
use trs_common::MicroUsdc;

/// A fiat transfer to a connected payout account. Amounts are converted to the rail's smallest
/// currency unit (cents) at the boundary.
#[derive(Debug, Clone)]
pub struct FiatTransfer {
    pub amount: MicroUsdc,
    pub destination_account: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ConnectAccount {
    pub id: String,
    pub payouts_enabled: bool,
}

/// The fiat payout rail (Stripe Connect in production).
#[allow(async_fn_in_trait)]
pub trait FiatRail: Clone {
    /// Executes the transfer and returns the rail's transfer id.
    async fn transfer(&self, transfer: FiatTransfer) -> Result<String, FiatRailError>;

    async fn retrieve_account(&self, account_id: &str) -> Result<ConnectAccount, FiatRailError>;
}

#[derive(Debug, Clone, Error)]
pub enum FiatRailError {
    #[error("Fiat rail request failed: {0}")]
    Request(String),
    #[error("Fiat rail rejected the call ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Could not parse fiat rail response: {0}")]
    Malformed(String),
}
