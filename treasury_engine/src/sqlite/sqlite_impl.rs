//! `SqliteLedger` is a concrete implementation of the treasury ledger backend.
//!
//! Unsurprisingly, it uses SQLite and implements all the ledger traits defined in the
//! [`crate::traits`] module. Composite payment transitions run inside a single transaction so
//! that due dates, payment rows, commissions and outbox rows commit or roll back together.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;
use trs_common::MicroUsdc;

use super::db::{audit, batches, commissions, intents, members, outbox, payments, transactions};
use crate::{
    db_types::{
        AuditEvent,
        AuditEventType,
        Commission,
        IntentStatus,
        MemberAccount,
        NewAuditEvent,
        NewCommission,
        NewMember,
        NewPayment,
        NewPayoutBatch,
        NewUsdcTransaction,
        OutboxMessage,
        Payment,
        PaymentIntent,
        PaymentKind,
        PayoutBatch,
        SweepStatus,
        TxHash,
        UsdcTransaction,
        WalletAddress,
    },
    traits::{
        data_objects::{InitialUnlockOutcome, MarkPaidOutcome, PositionAssignment, SubscriptionOutcome},
        AuditLedger,
        CommissionLedger,
        LedgerError,
        MemberLedger,
        Notification,
        PaymentLedger,
    },
};

const DEFAULT_NETWORK_WIDTH: i64 = 3;
const DEFAULT_NETWORK_DEPTH: i64 = 6;

#[derive(Clone)]
pub struct SqliteLedger {
    url: String,
    pool: SqlitePool,
    network_width: i64,
    network_depth: i64,
}

impl Debug for SqliteLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteLedger ({:?})", self.pool)
    }
}

impl SqliteLedger {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = super::db::new_pool(url, max_connections).await?;
        Ok(Self {
            url: url.to_string(),
            pool,
            network_width: DEFAULT_NETWORK_WIDTH,
            network_depth: DEFAULT_NETWORK_DEPTH,
        })
    }

    /// Overrides the 3-wide / 6-deep default network shape.
    pub fn with_network_shape(mut self, width: i64, depth: i64) -> Self {
        self.network_width = width;
        self.network_depth = depth;
        self
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl MemberLedger for SqliteLedger {
    async fn fetch_member(&self, member_id: i64) -> Result<Option<MemberAccount>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        members::fetch_member(member_id, &mut conn).await
    }

    async fn insert_member(&self, member: NewMember) -> Result<MemberAccount, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let member = members::insert_member(member, &mut conn).await?;
        debug!("🗃️ Member #{} has been saved in the ledger", member.id);
        Ok(member)
    }

    async fn fetch_billable_members(&self, after_id: i64, limit: u32) -> Result<Vec<MemberAccount>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        members::fetch_billable_members(after_id, limit, &mut conn).await
    }

    async fn assign_network_position(&self, member_id: i64) -> Result<Option<PositionAssignment>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let assignment =
            members::assign_network_position(member_id, self.network_width, self.network_depth, &mut tx).await?;
        tx.commit().await?;
        if let Some(a) = &assignment {
            debug!("🌳️ Member #{member_id} placed at {} (level {})", a.position_id, a.level);
        }
        Ok(assignment)
    }

    async fn update_payout_destination(
        &self,
        member_id: i64,
        wallet: Option<WalletAddress>,
        stripe_connect_id: Option<String>,
    ) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        members::update_payout_destination(member_id, wallet, stripe_connect_id, &mut conn).await
    }

    async fn set_qualified(&self, member_id: i64, qualified: bool) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        members::set_qualified(member_id, qualified, &mut conn).await
    }

    async fn fetch_sweep_candidates(
        &self,
        status: SweepStatus,
        limit: u32,
    ) -> Result<Vec<MemberAccount>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        members::fetch_sweep_candidates(status, limit, &mut conn).await
    }

    async fn mark_needs_funding(&self, member_id: i64, balance: MicroUsdc) -> Result<bool, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        members::mark_needs_funding(member_id, balance, &mut conn).await
    }

    async fn mark_funding_sent(&self, member_id: i64, fund_tx: &TxHash) -> Result<bool, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        members::mark_funding_sent(member_id, fund_tx, &mut conn).await
    }

    async fn mark_sweeping(&self, member_id: i64, sweep_tx: &TxHash) -> Result<bool, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        members::mark_sweeping(member_id, sweep_tx, &mut conn).await
    }

    async fn mark_sweep_complete(&self, member_id: i64) -> Result<bool, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        members::mark_sweep_complete(member_id, &mut conn).await
    }

    async fn mark_sweep_failed(&self, member_id: i64, error: &str) -> Result<bool, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        members::mark_sweep_failed(member_id, error, &mut conn).await
    }

    async fn increment_sweep_verify_attempts(&self, member_id: i64) -> Result<i64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        members::increment_sweep_verify_attempts(member_id, &mut conn).await
    }
}

impl PaymentLedger for SqliteLedger {
    async fn sum_deposits_since(&self, member_id: i64, cutoff: DateTime<Utc>) -> Result<MicroUsdc, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        transactions::sum_deposits_since(member_id, cutoff, &mut conn).await
    }

    async fn total_recorded_for_address(&self, address: &WalletAddress) -> Result<MicroUsdc, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        transactions::total_recorded_for_address(address, &mut conn).await
    }

    async fn record_transaction(&self, tx: NewUsdcTransaction) -> Result<UsdcTransaction, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let row = transactions::insert_transaction(tx, &mut conn).await?;
        debug!("🗃️ {} of {} recorded for member #{} (tx id {})", row.tx_type, row.amount, row.member_id, row.id);
        Ok(row)
    }

    async fn link_deposits_to_payment(&self, member_id: i64, payment_id: i64) -> Result<u64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        transactions::link_deposits_to_payment(member_id, payment_id, &mut conn).await
    }

    async fn fetch_or_create_intent(
        &self,
        member_id: i64,
        kind: PaymentKind,
        amount: MicroUsdc,
        period_key: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PaymentIntent, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        intents::fetch_or_create(member_id, kind, amount, period_key, expires_at, &mut conn).await
    }

    async fn update_intent_if_status_in(
        &self,
        intent_id: i64,
        from: &[IntentStatus],
        to: IntentStatus,
    ) -> Result<bool, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        intents::update_if_status_in(intent_id, from, to, &mut conn).await
    }

    async fn expire_stale_intents(&self, now: DateTime<Utc>) -> Result<u64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        intents::expire_stale(now, &mut conn).await
    }

    async fn fetch_payment_by_period(
        &self,
        member_id: i64,
        period_key: &str,
    ) -> Result<Option<Payment>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_by_period(member_id, period_key, &mut conn).await
    }

    async fn complete_initial_unlock(
        &self,
        member_id: i64,
        amount: MicroUsdc,
        previous_due: DateTime<Utc>,
        next_due: DateTime<Utc>,
        direct_bonus: Option<MicroUsdc>,
        correlation_id: &str,
    ) -> Result<InitialUnlockOutcome, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let member =
            members::fetch_member(member_id, &mut tx).await?.ok_or(LedgerError::MemberNotFound(member_id))?;
        // The unique (member_id, period_key) index makes this the idempotency gate: a duplicate
        // run fails here and the whole transaction rolls back untouched.
        let payment = payments::idempotent_insert(
            NewPayment { member_id, kind: PaymentKind::Initial, amount, period_key: "initial".to_string() },
            &mut tx,
        )
        .await?;
        let was_inactive = !member.is_active;
        members::set_unlocked_and_active(member_id, previous_due, next_due, &mut tx).await?;
        let ancestors_credited = if was_inactive {
            members::increment_upline_active(member_id, &mut tx).await?
        } else {
            0
        };
        let commission = match (member.referrer_id, direct_bonus) {
            (Some(referrer_id), Some(bonus)) => {
                let c = commissions::insert_commission(
                    NewCommission {
                        referrer_id,
                        source_member_id: member_id,
                        commission_type: crate::db_types::CommissionType::DirectBonus,
                        amount: bonus,
                    },
                    &mut tx,
                )
                .await?;
                outbox::enqueue(
                    referrer_id,
                    &Notification::DirectBonus { amount: bonus },
                    correlation_id,
                    &mut tx,
                )
                .await?;
                Some(c)
            },
            _ => None,
        };
        outbox::enqueue(
            member_id,
            &Notification::PaymentReceived { amount, payment_kind: PaymentKind::Initial },
            correlation_id,
            &mut tx,
        )
        .await?;
        transactions::link_deposits_to_payment(member_id, payment.id, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Initial unlock for member #{member_id} complete. {ancestors_credited} ancestors credited, \
             direct bonus: {:?}",
            commission.as_ref().map(|c| c.amount)
        );
        Ok(InitialUnlockOutcome { payment, commission, ancestors_credited })
    }

    async fn complete_subscription_period(
        &self,
        member_id: i64,
        amount: MicroUsdc,
        period_key: &str,
        fallback_previous: DateTime<Utc>,
        next_due: DateTime<Utc>,
        residual: Option<MicroUsdc>,
        correlation_id: &str,
    ) -> Result<SubscriptionOutcome, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let member =
            members::fetch_member(member_id, &mut tx).await?.ok_or(LedgerError::MemberNotFound(member_id))?;
        let kind = PaymentKind::for_subscription(member.payment_schedule);
        let payment = payments::idempotent_insert(
            NewPayment { member_id, kind, amount, period_key: period_key.to_string() },
            &mut tx,
        )
        .await?;
        members::roll_due_dates(member_id, fallback_previous, next_due, &mut tx).await?;
        let ancestors_credited = members::distribute_upline_volume(member_id, amount, &mut tx).await?;
        let commission = match (member.referrer_id, residual) {
            (Some(referrer_id), Some(residual)) if !residual.is_zero() => {
                let c = commissions::insert_commission(
                    NewCommission {
                        referrer_id,
                        source_member_id: member_id,
                        commission_type: crate::db_types::CommissionType::Residual,
                        amount: residual,
                    },
                    &mut tx,
                )
                .await?;
                Some(c)
            },
            _ => None,
        };
        outbox::enqueue(
            member_id,
            &Notification::PaymentReceived { amount, payment_kind: kind },
            correlation_id,
            &mut tx,
        )
        .await?;
        transactions::link_deposits_to_payment(member_id, payment.id, &mut tx).await?;
        tx.commit().await?;
        trace!("🗃️ Subscription period {period_key} recorded for member #{member_id}");
        Ok(SubscriptionOutcome { payment, commission, ancestors_credited })
    }
}

impl CommissionLedger for SqliteLedger {
    async fn create_commission(&self, commission: NewCommission) -> Result<Commission, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        commissions::insert_commission(commission, &mut conn).await
    }

    async fn fetch_commission(&self, commission_id: i64) -> Result<Option<Commission>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        commissions::fetch_commission(commission_id, &mut conn).await
    }

    async fn fetch_pending_unbatched(
        &self,
        min_amount: MicroUsdc,
        limit: u32,
    ) -> Result<Vec<Commission>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        commissions::fetch_pending_unbatched(min_amount, limit, &mut conn).await
    }

    async fn fetch_pending_batched(&self, limit: u32) -> Result<Vec<Commission>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        commissions::fetch_pending_batched(limit, &mut conn).await
    }

    async fn create_batch(
        &self,
        batch: NewPayoutBatch,
        commission_ids: &[i64],
    ) -> Result<(PayoutBatch, u64), LedgerError> {
        let mut tx = self.pool.begin().await?;
        let row = batches::insert_batch(batch, &mut tx).await?;
        let assigned = batches::assign_commissions(row.id, commission_ids, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Batch '{}' created with {assigned} commissions totalling {}", row.name, row.total_amount);
        Ok((row, assigned))
    }

    async fn mark_commission_paid(
        &self,
        commission_id: i64,
        method: &str,
        reference: &str,
    ) -> Result<MarkPaidOutcome, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        commissions::mark_paid(commission_id, method, reference, &mut conn).await
    }

    async fn record_payout_failure(&self, commission_id: i64, error: &str) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        commissions::record_failure(commission_id, error, &mut conn).await
    }
}

impl AuditLedger for SqliteLedger {
    async fn append_audit(&self, event: NewAuditEvent) -> Result<i64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        audit::append(event, &mut conn).await
    }

    async fn fetch_audit_events(
        &self,
        event_type: AuditEventType,
        limit: u32,
    ) -> Result<Vec<AuditEvent>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        audit::fetch_events(event_type, limit, &mut conn).await
    }

    async fn enqueue_notification(
        &self,
        member_id: i64,
        notification: &Notification,
        correlation_id: &str,
    ) -> Result<i64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        outbox::enqueue(member_id, notification, correlation_id, &mut conn).await
    }

    async fn fetch_pending_outbox(&self, limit: u32) -> Result<Vec<OutboxMessage>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        outbox::fetch_pending(limit, &mut conn).await
    }

    async fn mark_outbox_sent(&self, outbox_id: i64) -> Result<bool, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        outbox::mark_sent(outbox_id, &mut conn).await
    }
}
