use trs_common::MicroUsdc;

use crate::{
    db_types::{Commission, NewCommission, NewPayoutBatch, PayoutBatch},
    traits::{data_objects::MarkPaidOutcome, LedgerError},
};

/// Commission and payout-batch operations. The two invariants this trait encodes:
/// a commission transitions to `Paid` at most once, and a commission is assigned to at most one
/// batch (assignment always filters on `payout_batch_id IS NULL`).
#[allow(async_fn_in_trait)]
pub trait CommissionLedger: Clone {
    async fn create_commission(&self, commission: NewCommission) -> Result<Commission, LedgerError>;

    async fn fetch_commission(&self, commission_id: i64) -> Result<Option<Commission>, LedgerError>;

    /// Pending commissions not yet assigned to a batch, at or above the minimum payout amount,
    /// oldest first, capped at `limit`.
    async fn fetch_pending_unbatched(&self, min_amount: MicroUsdc, limit: u32) -> Result<Vec<Commission>, LedgerError>;

    /// Pending commissions that already belong to a batch, oldest first. The payout executor
    /// cron works through these.
    async fn fetch_pending_batched(&self, limit: u32) -> Result<Vec<Commission>, LedgerError>;

    /// Inserts the batch row and stamps `payout_batch_id` on the given commissions in the same
    /// transaction. Commissions that gained a batch id since being fetched are skipped by the
    /// `payout_batch_id IS NULL` filter; the number actually assigned is returned with the batch.
    async fn create_batch(
        &self,
        batch: NewPayoutBatch,
        commission_ids: &[i64],
    ) -> Result<(PayoutBatch, u64), LedgerError>;

    /// One-way `Pending -> Paid` transition, clearing `error_message` and recording how the
    /// money moved. Returns [`MarkPaidOutcome::AlreadyPaid`] without touching the row if the
    /// commission is not `Pending`.
    async fn mark_commission_paid(
        &self,
        commission_id: i64,
        method: &str,
        reference: &str,
    ) -> Result<MarkPaidOutcome, LedgerError>;

    /// Records a payout failure on the commission row: sets `error_message`, bumps
    /// `retry_count`, leaves the status `Pending` so a later run may retry.
    async fn record_payout_failure(&self, commission_id: i64, error: &str) -> Result<(), LedgerError>;
}
