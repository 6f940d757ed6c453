use chrono::{DateTime, TimeZone, Utc};
use log::*;

use crate::{
    db_types::{AuditEventType, MemberAccount, NewAuditEvent, NewUsdcTransaction},
    pipeline_api::{
        errors::DepositMonitorError,
        objects::{MemberPaymentStatus, MonitorRunResult, RunError},
        payment_flow::PaymentFlowApi,
        settings::PricingSettings,
    },
    traits::{ChainClient, LedgerStore},
};

/// `DepositMonitorApi` walks every member with a custodial deposit address, decides whether
/// they have paid enough for the current billing period, and triggers processing when they have.
///
/// The crediting order is the load-bearing part: new on-chain funds are recorded as a deposit
/// transaction *first*, and only then counted towards the period. If the record insert fails the
/// member is skipped for this run — crediting unrecorded money would double-count it on retry.
pub struct DepositMonitorApi<B, C> {
    db: B,
    chain: C,
    flow: PaymentFlowApi<B>,
    pricing: PricingSettings,
}

impl<B, C> std::fmt::Debug for DepositMonitorApi<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DepositMonitorApi")
    }
}

impl<B, C> DepositMonitorApi<B, C>
where
    B: LedgerStore,
    C: ChainClient,
{
    pub fn new(db: B, chain: C, pricing: PricingSettings) -> Self {
        let flow = PaymentFlowApi::new(db.clone(), pricing.clone());
        Self { db, chain, flow, pricing }
    }

    /// One monitor invocation: a bounded batch of members, per-member failures collected into
    /// the result rather than aborting the run.
    pub async fn run(&self) -> Result<MonitorRunResult, DepositMonitorError> {
        let now = Utc::now();
        let mut result = MonitorRunResult { intents_expired: self.db.expire_stale_intents(now).await?, ..Default::default() };
        let members = self.db.fetch_billable_members(0, self.pricing.monitor_batch_size).await?;
        debug!("👁️ Deposit monitor examining {} members", members.len());
        for member in &members {
            result.processed += 1;
            match self.check_member(member, now).await {
                Ok((status, recorded)) => {
                    if recorded {
                        result.deposits_recorded += 1;
                    }
                    match status {
                        MemberPaymentStatus::Processed => result.payments_completed += 1,
                        MemberPaymentStatus::InFlight => result.in_flight += 1,
                        MemberPaymentStatus::UpToDate => result.up_to_date += 1,
                        MemberPaymentStatus::Underpaid { paid, expected } => {
                            result.underpaid += 1;
                            trace!("👁️ Member #{} underpaid: {paid} of {expected}", member.id);
                        },
                    }
                },
                Err(e) => {
                    warn!("👁️ Deposit check failed for member #{}: {e}", member.id);
                    result.errors.push(RunError { subject_id: member.id, error: e.to_string() });
                },
            }
        }
        info!(
            "👁️ Monitor run complete: {} members, {} payments completed, {} deposits recorded, {} underpaid, {} errors",
            result.processed,
            result.payments_completed,
            result.deposits_recorded,
            result.underpaid,
            result.errors.len()
        );
        Ok(result)
    }

    /// Period-based accounting for a single member.
    async fn check_member(
        &self,
        member: &MemberAccount,
        now: DateTime<Utc>,
    ) -> Result<(MemberPaymentStatus, bool), DepositMonitorError> {
        let period_start =
            member.previous_payment_due_date.unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap_or(now));
        let expected = self.pricing.expected_for(member);
        let tolerance = expected.bps(self.pricing.tolerance_bps);
        let paid = self.db.sum_deposits_since(member.id, period_start).await?;

        // A period whose due date has already been rolled past "now" is settled; counting its
        // deposits again would re-process the same payment.
        let already_rolled = member.next_payment_due_date.map_or(false, |next| next > now)
            && (member.initial_payment_completed || member.bypass_initial_payment);
        if already_rolled {
            return Ok((MemberPaymentStatus::UpToDate, false));
        }
        if expected - paid <= tolerance {
            // Completed but unprocessed: money is recorded, side effects are not.
            let status = self.flow.process_completed_payment(member, now).await?;
            return Ok((status, false));
        }

        // Short on recorded funds: look for unrecorded money at the deposit address.
        let balance = self.chain.usdc_balance(&member.deposit_address).await?;
        let recorded_lifetime = self.db.total_recorded_for_address(&member.deposit_address).await?;
        let unrecorded = balance - recorded_lifetime;
        let mut recorded_new = false;
        if unrecorded >= self.pricing.min_recordable_deposit {
            // The insert MUST land before any crediting. A failure here aborts this member for
            // the run; the funds stay on chain and are recorded next time.
            let tx = self
                .db
                .record_transaction(NewUsdcTransaction::deposit(member.id, unrecorded, member.deposit_address.clone()))
                .await?;
            recorded_new = true;
            self.db
                .append_audit(
                    NewAuditEvent::for_member(AuditEventType::DepositDetected, member.id)
                        .with_amount(unrecorded)
                        .with_detail(serde_json::json!({
                            "transaction_id": tx.id,
                            "address": member.deposit_address.as_str(),
                        })),
                )
                .await?;
            info!("👁️ Recorded unrecorded deposit of {unrecorded} for member #{}", member.id);
            // A non-zero custodial balance is sweepable once the payment is settled.
            let _ = self.db.mark_needs_funding(member.id, balance).await?;

            let paid = self.db.sum_deposits_since(member.id, period_start).await?;
            if expected - paid <= tolerance {
                let status = self.flow.process_completed_payment(member, now).await?;
                return Ok((status, recorded_new));
            }
            return Ok((MemberPaymentStatus::Underpaid { paid, expected }, recorded_new));
        }
        Ok((MemberPaymentStatus::Underpaid { paid, expected }, recorded_new))
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
