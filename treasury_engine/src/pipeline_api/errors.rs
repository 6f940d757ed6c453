use thiserror::Error;

use crate::traits::{ChainClientError, FiatRailError, LedgerError};

#[derive(Debug, Clone, Error)]
pub enum DepositMonitorError {
    #[error("{0}")]
    Ledger(#[from] LedgerError),
    #[error("{0}")]
    Chain(#[from] ChainClientError),
    #[error("{0}")]
    Flow(#[from] PaymentFlowError),
}

#[derive(Debug, Clone, Error)]
pub enum PaymentFlowError {
    #[error("{0}")]
    Ledger(#[from] LedgerError),
    #[error("Member {0} does not exist")]
    MemberNotFound(i64),
}

#[derive(Debug, Clone, Error)]
pub enum PayoutError {
    #[error("{0}")]
    Ledger(#[from] LedgerError),
    #[error("{0}")]
    Chain(#[from] ChainClientError),
    #[error("{0}")]
    Fiat(#[from] FiatRailError),
    #[error("Commission {0} does not exist")]
    CommissionNotFound(i64),
    #[error("The payout wallet holds insufficient USDC for this payout")]
    TreasuryUnderfunded,
}

#[derive(Debug, Clone, Error)]
pub enum SweepError {
    #[error("{0}")]
    Ledger(#[from] LedgerError),
    #[error("{0}")]
    Chain(#[from] ChainClientError),
}

#[derive(Debug, Clone, Error)]
pub enum TreasuryMonitorError {
    #[error("{0}")]
    Ledger(#[from] LedgerError),
    #[error("{0}")]
    Chain(#[from] ChainClientError),
}
