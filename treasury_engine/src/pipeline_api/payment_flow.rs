use chrono::{DateTime, Utc};
use log::*;
use trs_common::MicroUsdc;

use crate::{
    db_types::{IntentStatus, MemberAccount, PaymentKind},
    helpers::{anchor_date, next_due_date, period_key},
    pipeline_api::{
        errors::PaymentFlowError,
        objects::MemberPaymentStatus,
        settings::PricingSettings,
    },
    traits::{LedgerError, LedgerStore},
};

/// `PaymentFlowApi` owns the side effects of a completed payment: the initial-unlock and
/// subscription-renewal transitions of §payment processing, driven through the payment-intent
/// state machine so that overlapping runs cannot double-apply them.
pub struct PaymentFlowApi<B> {
    db: B,
    pricing: PricingSettings,
}

impl<B> std::fmt::Debug for PaymentFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentFlowApi")
    }
}

impl<B: Clone> Clone for PaymentFlowApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), pricing: self.pricing.clone() }
    }
}

impl<B> PaymentFlowApi<B>
where B: LedgerStore
{
    pub fn new(db: B, pricing: PricingSettings) -> Self {
        Self { db, pricing }
    }

    /// Processes a payment the deposit monitor has found to be sufficient.
    ///
    /// The member's intent for the current period is created (or fetched) and entered through
    /// the `AwaitingFunds -> Processing` compare-and-swap. A failed swap means another run is
    /// already handling this intent and is reported as [`MemberPaymentStatus::InFlight`] — not
    /// an error. The actual transition is a single atomic ledger operation keyed by the period,
    /// so a crash between the swap and the commit leaves a retryable intent and nothing else.
    pub async fn process_completed_payment(
        &self,
        member: &MemberAccount,
        now: DateTime<Utc>,
    ) -> Result<MemberPaymentStatus, PaymentFlowError> {
        let kind = member.expected_payment_kind();
        let amount = self.pricing.expected_amount(kind);
        // The due date being satisfied. Members without one (bypass accounts on their first
        // subscription payment) anchor a fresh chain at the moment of processing.
        let due = member.next_payment_due_date.unwrap_or_else(|| anchor_date(Utc::now()));
        let key = match kind {
            PaymentKind::Initial => "initial".to_string(),
            _ => period_key(member.payment_schedule, due),
        };
        let intent = self
            .db
            .fetch_or_create_intent(member.id, kind, amount, &key, now + self.pricing.intent_ttl)
            .await?;
        let claimed = self
            .db
            .update_intent_if_status_in(
                intent.id,
                &[IntentStatus::Created, IntentStatus::AwaitingFunds],
                IntentStatus::Processing,
            )
            .await?;
        if !claimed {
            trace!("🔄️💰️ Intent #{} for member #{} is already being handled elsewhere", intent.id, member.id);
            return Ok(MemberPaymentStatus::InFlight);
        }
        let correlation_id = format!("pay-{}-{key}", member.id);
        let result = if kind.is_initial() {
            self.run_initial_unlock(member, amount, &correlation_id).await
        } else {
            self.run_subscription(member, due, amount, &key, &correlation_id).await
        };
        match result {
            Ok(()) => {
                self.db
                    .update_intent_if_status_in(intent.id, &[IntentStatus::Processing], IntentStatus::Completed)
                    .await?;
                Ok(MemberPaymentStatus::Processed)
            },
            Err(PaymentFlowError::Ledger(LedgerError::PaymentAlreadyRecorded { .. })) => {
                // The period was settled by an earlier run that died before completing its
                // intent. The ledger is correct; just close the intent out.
                self.db
                    .update_intent_if_status_in(intent.id, &[IntentStatus::Processing], IntentStatus::Completed)
                    .await?;
                debug!("🔄️💰️ Period {key} for member #{} was already settled", member.id);
                Ok(MemberPaymentStatus::UpToDate)
            },
            Err(e) => {
                // Release the intent so the next run can retry.
                self.db
                    .update_intent_if_status_in(intent.id, &[IntentStatus::Processing], IntentStatus::AwaitingFunds)
                    .await?;
                Err(e)
            },
        }
    }

    async fn run_initial_unlock(
        &self,
        member: &MemberAccount,
        amount: MicroUsdc,
        correlation_id: &str,
    ) -> Result<(), PaymentFlowError> {
        // Position assignment is idempotent (guarded by a presence check) and safe to commit
        // before the unlock transaction: a crash in between re-enters here as a no-op.
        match self.db.assign_network_position(member.id).await {
            Ok(Some(assignment)) => {
                debug!("🔄️🌳️ Member #{} placed at {}", member.id, assignment.position_id);
            },
            Ok(None) => {},
            Err(LedgerError::ReferrerHasNoPosition(id)) | Err(LedgerError::NetworkSubtreeFull(id)) => {
                // Placement failures do not hold the member's money hostage; the unlock proceeds
                // and placement is retried by a later support action.
                warn!("🔄️🌳️ Could not place member #{id} in the network tree; continuing with unlock");
            },
            Err(e) => return Err(e.into()),
        }
        // Anchor at the moment of processing, not at run start: the deposit that paid for this
        // unlock was recorded seconds ago and must fall before the new period boundary.
        let previous_due = anchor_date(Utc::now());
        let next_due = next_due_date(previous_due, member.payment_schedule);
        let bonus = member.referrer_id.map(|_| amount.bps(self.pricing.direct_bonus_bps));
        let outcome = self
            .db
            .complete_initial_unlock(member.id, amount, previous_due, next_due, bonus, correlation_id)
            .await?;
        info!(
            "🔄️💰️ Member #{} unlocked with payment #{}; {} upline members credited",
            member.id, outcome.payment.id, outcome.ancestors_credited
        );
        Ok(())
    }

    async fn run_subscription(
        &self,
        member: &MemberAccount,
        due: DateTime<Utc>,
        amount: MicroUsdc,
        key: &str,
        correlation_id: &str,
    ) -> Result<(), PaymentFlowError> {
        let next_due = next_due_date(due, member.payment_schedule);
        let residual = member.referrer_id.map(|_| amount.bps(self.pricing.residual_bps));
        let outcome = self
            .db
            .complete_subscription_period(member.id, amount, key, due, next_due, residual, correlation_id)
            .await?;
        info!(
            "🔄️💰️ Subscription period {key} settled for member #{} with payment #{}",
            member.id, outcome.payment.id
        );
        Ok(())
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
