//! Run summaries returned by the pipelines. The cron endpoints serialise these verbatim, so a
//! partial failure is visible to the scheduler as data rather than as an HTTP error.

use serde::{Deserialize, Serialize};
use trs_common::MicroUsdc;

use crate::db_types::{PayoutBatch, TxHash};

/// One member's error within a batch run. Per-member failures never abort the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub subject_id: i64,
    pub error: String,
}

/// What the deposit monitor concluded about one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberPaymentStatus {
    /// A completed payment was processed this run.
    Processed,
    /// Another run holds the member's payment intent.
    InFlight,
    /// The current period was already settled; nothing to do.
    UpToDate,
    /// Funds recorded but short of the expected amount.
    Underpaid { paid: MicroUsdc, expected: MicroUsdc },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorRunResult {
    pub processed: u32,
    pub payments_completed: u32,
    pub deposits_recorded: u32,
    pub underpaid: u32,
    pub up_to_date: u32,
    pub in_flight: u32,
    pub intents_expired: u64,
    pub errors: Vec<RunError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRunResult {
    pub direct_bonus_batch: Option<BatchSummary>,
    pub residual_batch: Option<BatchSummary>,
    /// Commissions left unbatched because the referrer has no payout destination on file.
    pub skipped_no_destination: u32,
    /// Commissions left unbatched because the referrer's total is below the minimum payout.
    pub skipped_below_minimum: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: i64,
    pub name: String,
    pub total_amount: MicroUsdc,
    pub payout_count: i64,
    pub gas_estimate_wei: String,
}

impl From<PayoutBatch> for BatchSummary {
    fn from(batch: PayoutBatch) -> Self {
        Self {
            batch_id: batch.id,
            name: batch.name,
            total_amount: batch.total_amount,
            payout_count: batch.payout_count,
            gas_estimate_wei: batch.gas_estimate_wei,
        }
    }
}

/// Outcome of a single payout execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PayoutOutcome {
    /// Money moved and the commission is marked paid.
    Executed { method: String, reference: String, net_amount: MicroUsdc },
    /// The commission was already paid; nothing happened.
    Skipped,
    /// A recorded business failure: the commission stays pending with an error message.
    Failed { reason: String },
    /// The transfer went out but the ledger update failed. The transaction hash is surfaced for
    /// manual reconciliation; retrying automatically could double-pay.
    ReconciliationRequired { tx_hash: TxHash },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayoutRunResult {
    pub processed: u32,
    pub executed: u32,
    pub skipped: u32,
    pub failed: u32,
    pub reconciliation_required: u32,
    pub errors: Vec<RunError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepRunResult {
    pub processed: u32,
    pub advanced: u32,
    pub pending: u32,
    pub failed: u32,
    pub errors: Vec<RunError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceLevel {
    Ok,
    Warning,
    Critical,
}

impl std::fmt::Display for BalanceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BalanceLevel::Ok => write!(f, "ok"),
            BalanceLevel::Warning => write!(f, "warning"),
            BalanceLevel::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreasuryReport {
    pub gas_balance_wei: String,
    pub gas_level: BalanceLevel,
    /// Rough number of payout transactions the gas tank can still fund.
    pub estimated_remaining_txs: u64,
    pub payout_balance: MicroUsdc,
    pub payout_level: BalanceLevel,
    pub alerts_sent: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboxRunResult {
    pub processed: u32,
    pub delivered: u32,
    pub queued: u32,
    pub failed: u32,
}
