//! The pipeline APIs: one per reconciliation job. Each is a thin struct generic over the ledger
//! traits (and, where needed, the chain client and fiat rail) so the jobs can be driven against
//! mocks in tests and against SQLite + Polygon + Stripe in production.

mod deposit_monitor;
pub mod errors;
mod objects;
mod payment_flow;
mod payout_batcher;
mod payout_executor;
pub mod settings;
mod sweep;
mod treasury_monitor;

pub use deposit_monitor::DepositMonitorApi;
pub use objects::{
    BalanceLevel,
    BatchRunResult,
    BatchSummary,
    MemberPaymentStatus,
    MonitorRunResult,
    OutboxRunResult,
    PayoutOutcome,
    PayoutRunResult,
    RunError,
    SweepRunResult,
    TreasuryReport,
};
pub use payment_flow::PaymentFlowApi;
pub use payout_batcher::PayoutBatcherApi;
pub use payout_executor::PayoutExecutorApi;
pub use sweep::SweepApi;
pub use treasury_monitor::TreasuryMonitorApi;
