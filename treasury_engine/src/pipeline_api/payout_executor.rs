use std::collections::HashMap;

use log::*;
use trs_common::MicroUsdc;

use crate::{
    db_types::{
        Actor,
        AuditEventType,
        Commission,
        CommissionStatus,
        MemberAccount,
        NewAuditEvent,
        NewUsdcTransaction,
        WalletAddress,
    },
    pipeline_api::{
        errors::PayoutError,
        objects::{PayoutOutcome, PayoutRunResult, RunError},
        settings::PayoutSettings,
    },
    traits::{
        data_objects::MarkPaidOutcome,
        ChainClient,
        FiatRail,
        FiatTransfer,
        LedgerStore,
        Notification,
        TreasuryWallet,
    },
};

/// `PayoutExecutorApi` pays out a single commission, exactly once, over the crypto or fiat rail.
///
/// Preconditions run in a fixed order and each failure is persisted to the commission row with a
/// member-facing notification. A commission that is already `Paid` short-circuits to `Skipped`
/// before anything else happens — the second call must never move money again.
pub struct PayoutExecutorApi<B, C, F> {
    db: B,
    chain: C,
    rail: F,
    settings: PayoutSettings,
}

impl<B, C, F> std::fmt::Debug for PayoutExecutorApi<B, C, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PayoutExecutorApi")
    }
}

impl<B, C, F> PayoutExecutorApi<B, C, F>
where
    B: LedgerStore,
    C: ChainClient,
    F: FiatRail,
{
    pub fn new(db: B, chain: C, rail: F, settings: PayoutSettings) -> Self {
        Self { db, chain, rail, settings }
    }

    /// Pays every pending, batched commission, one at a time. A single commission's failure is
    /// recorded and the run continues.
    pub async fn run(&self, actor: Actor) -> Result<PayoutRunResult, PayoutError> {
        let pending = self.db.fetch_pending_batched(self.settings.executor_page_size).await?;
        let mut result = PayoutRunResult::default();
        for commission in &pending {
            result.processed += 1;
            match self.execute(commission.id, actor).await {
                Ok(PayoutOutcome::Executed { .. }) => result.executed += 1,
                Ok(PayoutOutcome::Skipped) => result.skipped += 1,
                Ok(PayoutOutcome::Failed { .. }) => result.failed += 1,
                Ok(PayoutOutcome::ReconciliationRequired { tx_hash }) => {
                    result.reconciliation_required += 1;
                    error!(
                        "💸️🚨️ Commission #{} transferred as {tx_hash} but the ledger update failed. Manual \
                         reconciliation required.",
                        commission.id
                    );
                },
                Err(e) => {
                    warn!("💸️ Payout of commission #{} errored: {e}", commission.id);
                    result.errors.push(RunError { subject_id: commission.id, error: e.to_string() });
                },
            }
        }
        info!(
            "💸️ Payout run complete: {} processed, {} executed, {} skipped, {} failed",
            result.processed, result.executed, result.skipped, result.failed
        );
        Ok(result)
    }

    /// Executes one payout. Returns `Skipped` for a commission that is already paid, `Failed`
    /// for recorded business failures (persisted to the row), and errors only for operational
    /// conditions where nothing about the commission should change.
    pub async fn execute(&self, commission_id: i64, actor: Actor) -> Result<PayoutOutcome, PayoutError> {
        let commission =
            self.db.fetch_commission(commission_id).await?.ok_or(PayoutError::CommissionNotFound(commission_id))?;
        // Never double-pay. No audit entry either: nothing was executed.
        if commission.status == CommissionStatus::Paid {
            debug!("💸️ Commission #{commission_id} is already paid; skipping");
            return Ok(PayoutOutcome::Skipped);
        }
        let referrer = self
            .db
            .fetch_member(commission.referrer_id)
            .await?
            .ok_or(crate::traits::LedgerError::MemberNotFound(commission.referrer_id))?;

        // Qualification is a hard stop, not retried automatically.
        if !referrer.qualified {
            return self.record_failure(&commission, actor, "Referrer is not qualification-eligible").await;
        }
        if let Some(wallet) = referrer.payout_wallet.clone() {
            self.execute_crypto(&commission, &referrer, wallet, actor).await
        } else if let Some(account_id) = referrer.stripe_connect_id.clone() {
            self.execute_fiat(&commission, &referrer, &account_id, actor).await
        } else {
            self.record_failure(&commission, actor, "No payout destination configured").await
        }
    }

    async fn execute_crypto(
        &self,
        commission: &Commission,
        referrer: &MemberAccount,
        destination: WalletAddress,
        actor: Actor,
    ) -> Result<PayoutOutcome, PayoutError> {
        let payout_wallet = self.chain.wallet_address(TreasuryWallet::Payout).clone();
        let balance = self.chain.usdc_balance(&payout_wallet).await?;
        if balance < commission.amount {
            // Operational shortfall: abort without touching the commission. The treasury
            // monitor's alerting owns this condition.
            warn!(
                "💸️ Payout wallet balance {balance} is below commission #{} amount {}; aborting",
                commission.id, commission.amount
            );
            return Err(PayoutError::TreasuryUnderfunded);
        }
        let tx_hash = self.chain.send_usdc(TreasuryWallet::Payout, &destination, commission.amount).await?;
        // Money has moved. Any ledger failure from here on is surfaced with the hash instead of
        // being retried: a retry would pay twice.
        let recorded = self
            .db
            .record_transaction(NewUsdcTransaction::payout(
                referrer.id,
                commission.amount,
                payout_wallet,
                destination.clone(),
                tx_hash.clone(),
                commission.id,
            ))
            .await;
        if recorded.is_err() {
            return Ok(PayoutOutcome::ReconciliationRequired { tx_hash });
        }
        match self.db.mark_commission_paid(commission.id, "usdc", tx_hash.as_str()).await {
            Ok(MarkPaidOutcome::Paid) => {},
            Ok(MarkPaidOutcome::AlreadyPaid) | Err(_) => {
                return Ok(PayoutOutcome::ReconciliationRequired { tx_hash });
            },
        }
        self.finish(commission, referrer, "usdc", tx_hash.as_str(), commission.amount, actor, &destination.to_string())
            .await?;
        Ok(PayoutOutcome::Executed {
            method: "usdc".to_string(),
            reference: tx_hash.0,
            net_amount: commission.amount,
        })
    }

    async fn execute_fiat(
        &self,
        commission: &Commission,
        referrer: &MemberAccount,
        account_id: &str,
        actor: Actor,
    ) -> Result<PayoutOutcome, PayoutError> {
        let account = self.rail.retrieve_account(account_id).await?;
        if !account.payouts_enabled {
            return self.record_failure(commission, actor, "Stripe account has payouts disabled").await;
        }
        // Fiat payouts carry the fixed processing fee; crypto payouts do not.
        let fee = commission.amount.bps(self.settings.stripe_fee_bps);
        let net = commission.amount - fee;
        let mut metadata = HashMap::new();
        metadata.insert("commission_id".to_string(), commission.id.to_string());
        metadata.insert("actor".to_string(), actor.to_string());
        let transfer_id = self
            .rail
            .transfer(FiatTransfer { amount: net, destination_account: account_id.to_string(), metadata })
            .await?;
        match self.db.mark_commission_paid(commission.id, "stripe", &transfer_id).await {
            Ok(MarkPaidOutcome::Paid) => {},
            Ok(MarkPaidOutcome::AlreadyPaid) | Err(_) => {
                return Ok(PayoutOutcome::ReconciliationRequired { tx_hash: transfer_id.clone().into() });
            },
        }
        self.finish(commission, referrer, "stripe", &transfer_id, net, actor, account_id).await?;
        Ok(PayoutOutcome::Executed { method: "stripe".to_string(), reference: transfer_id, net_amount: net })
    }

    async fn finish(
        &self,
        commission: &Commission,
        referrer: &MemberAccount,
        method: &str,
        reference: &str,
        net: MicroUsdc,
        actor: Actor,
        destination: &str,
    ) -> Result<(), PayoutError> {
        let correlation_id = format!("payout-{}", commission.id);
        self.db
            .enqueue_notification(
                referrer.id,
                &Notification::PayoutProcessed { amount: net, method: method.to_string() },
                &correlation_id,
            )
            .await?;
        self.db
            .append_audit(
                NewAuditEvent::for_member(AuditEventType::PayoutExecuted, referrer.id).with_amount(net).with_detail(
                    serde_json::json!({
                        "commission_id": commission.id,
                        "method": method,
                        "reference": reference,
                        "destination": destination,
                        "actor": actor.to_string(),
                    }),
                ),
            )
            .await?;
        Ok(())
    }

    /// A recorded business failure: error onto the row, notification out, audit entry, and the
    /// commission stays pending for a later retry.
    async fn record_failure(
        &self,
        commission: &Commission,
        actor: Actor,
        reason: &str,
    ) -> Result<PayoutOutcome, PayoutError> {
        self.db.record_payout_failure(commission.id, reason).await?;
        let correlation_id = format!("payout-{}", commission.id);
        self.db
            .enqueue_notification(
                commission.referrer_id,
                &Notification::PayoutFailed { amount: commission.amount, reason: reason.to_string() },
                &correlation_id,
            )
            .await?;
        self.db
            .append_audit(
                NewAuditEvent::for_member(AuditEventType::PayoutFailed, commission.referrer_id)
                    .with_amount(commission.amount)
                    .with_detail(serde_json::json!({
                        "commission_id": commission.id,
                        "reason": reason,
                        "actor": actor.to_string(),
                    })),
            )
            .await?;
        Ok(PayoutOutcome::Failed { reason: reason.to_string() })
    }
}
