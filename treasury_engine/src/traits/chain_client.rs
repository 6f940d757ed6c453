use thiserror::Error;
use trs_common::MicroUsdc;

use crate::db_types::{TxHash, WalletAddress};

/// The two operational wallets the treasury signs with. `Gas` pays for sweep funding, `Payout`
/// holds the USDC that commissions are paid from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreasuryWallet {
    Gas,
    Payout,
}

/// A mined transaction's outcome. `success == false` means the transaction reverted on chain.
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub success: bool,
    pub block_number: Option<u64>,
}

/// EIP-1559 fee data, in wei.
#[derive(Debug, Clone, Copy)]
pub struct FeeEstimate {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Read and broadcast access to the chain carrying the custodial USDC.
///
/// Every method is a remote call with an explicit client-side timeout; a timeout surfaces as
/// [`ChainClientError::Timeout`], which callers treat as "unknown, retry next run" — never as a
/// confirmed failure.
#[allow(async_fn_in_trait)]
pub trait ChainClient: Clone {
    /// USDC balance of an arbitrary address, in micro-units.
    async fn usdc_balance(&self, address: &WalletAddress) -> Result<MicroUsdc, ChainClientError>;

    /// Native-token balance of an arbitrary address, in wei.
    async fn native_balance(&self, address: &WalletAddress) -> Result<u128, ChainClientError>;

    /// The receipt for a broadcast transaction, or `None` while it is still pending.
    async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>, ChainClientError>;

    /// Broadcasts a native-token transfer from a treasury wallet. The explicit `nonce` lets the
    /// sweep funding stage fan out several transfers in one run without waiting for
    /// confirmations; `None` uses the wallet's next pending nonce.
    async fn send_native(
        &self,
        from: TreasuryWallet,
        to: &WalletAddress,
        amount_wei: u128,
        nonce: Option<u64>,
    ) -> Result<TxHash, ChainClientError>;

    /// Broadcasts a USDC transfer from a treasury wallet.
    async fn send_usdc(
        &self,
        from: TreasuryWallet,
        to: &WalletAddress,
        amount: MicroUsdc,
    ) -> Result<TxHash, ChainClientError>;

    /// Broadcasts a USDC transfer out of a member's custodial deposit address, signed with the
    /// key at `derivation_index`.
    async fn sweep_usdc(
        &self,
        derivation_index: i64,
        from: &WalletAddress,
        to: &WalletAddress,
        amount: MicroUsdc,
    ) -> Result<TxHash, ChainClientError>;

    /// The next pending nonce for a treasury wallet.
    async fn pending_nonce(&self, wallet: TreasuryWallet) -> Result<u64, ChainClientError>;

    /// The on-chain address of a treasury wallet.
    fn wallet_address(&self, wallet: TreasuryWallet) -> &WalletAddress;

    async fn fee_estimate(&self) -> Result<FeeEstimate, ChainClientError>;
}

#[derive(Debug, Clone, Error)]
pub enum ChainClientError {
    #[error("RPC transport error: {0}")]
    Transport(String),
    #[error("RPC call timed out after {0} ms")]
    Timeout(u64),
    #[error("Malformed chain data: {0}")]
    MalformedResponse(String),
    #[error("No signing key available for derivation index {0}")]
    MissingKey(i64),
    #[error("Invalid chain configuration: {0}")]
    Configuration(String),
}

impl ChainClientError {
    /// Timeouts and transport failures are transient: nothing is known about the state of the
    /// request, and the caller should leave state untouched and retry on the next run.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainClientError::Transport(_) | ChainClientError::Timeout(_))
    }
}
