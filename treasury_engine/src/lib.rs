//! Treasury Engine
//!
//! The core of the treasury server: deposit reconciliation, payment processing, commission
//! payouts, custodial sweeps and operational-balance monitoring, all expressed as stateless
//! pipeline runs over a transactional ledger store. The library is provider-agnostic at its
//! seams:
//!
//! 1. Storage ([`mod@sqlite`]) implements the ledger traits in [`mod@traits`]. You should never
//!    need to touch the database directly; drive everything through the pipeline APIs. The row
//!    types in [`mod@db_types`] are public.
//! 2. The pipeline APIs ([`DepositMonitorApi`], [`PaymentFlowApi`], [`PayoutBatcherApi`],
//!    [`PayoutExecutorApi`], [`SweepApi`], [`TreasuryMonitorApi`]) carry the reconciliation
//!    logic. Each is generic over the ledger traits plus the external collaborators it needs —
//!    the chain client ([`mod@chain`]), the fiat rail ([`mod@fiat`]) and the notification
//!    outbox ([`mod@dispatch`]) — so every job can run against mocks.
//!
//! Every pipeline is designed to be invoked by an external scheduler, process a bounded batch,
//! and be safe to re-run: exclusion lives in the store's compare-and-swap primitives and in
//! one-way status machines, never in process-level locks.
pub mod chain;
pub mod db_types;
pub mod dispatch;
pub mod fiat;
pub mod helpers;
mod pipeline_api;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use pipeline_api::{
    errors::{DepositMonitorError, PaymentFlowError, PayoutError, SweepError, TreasuryMonitorError},
    settings::{PayoutSettings, PricingSettings, SweepSettings, TreasurySettings},
    BalanceLevel,
    BatchRunResult,
    BatchSummary,
    DepositMonitorApi,
    MemberPaymentStatus,
    MonitorRunResult,
    OutboxRunResult,
    PaymentFlowApi,
    PayoutBatcherApi,
    PayoutExecutorApi,
    PayoutOutcome,
    PayoutRunResult,
    RunError,
    SweepApi,
    SweepRunResult,
    TreasuryMonitorApi,
    TreasuryReport,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLedger;
