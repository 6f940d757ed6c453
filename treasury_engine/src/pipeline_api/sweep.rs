use log::*;

use crate::{
    db_types::{AuditEventType, MemberAccount, NewAuditEvent, SweepStatus, TxHash},
    pipeline_api::{
        errors::SweepError,
        objects::{RunError, SweepRunResult},
        settings::SweepSettings,
    },
    traits::{ChainClient, LedgerStore, TreasuryWallet},
};

/// `SweepApi` moves residual custodial balances to the treasury in three cron stages that talk
/// to each other only through each member's `sweep_status` field:
///
/// * **fund** — `NeedsFunding` members get a small native-token transfer so their deposit
///   address can pay for its own ERC-20 sweep. Broadcasts go out with manually incremented
///   nonces and are not awaited (fire-and-forget for throughput).
/// * **dispatch** — `FundingSent` members whose gas has arrived get the actual USDC sweep
///   broadcast, moving them to `Sweeping`.
/// * **verify** — `Sweeping` members have their sweep receipt polled: still pending leaves the
///   state untouched, success returns them to `Idle`, a revert parks them in `Failed` for
///   manual intervention.
pub struct SweepApi<B, C> {
    db: B,
    chain: C,
    settings: SweepSettings,
}

impl<B, C> std::fmt::Debug for SweepApi<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SweepApi")
    }
}

impl<B, C> SweepApi<B, C>
where
    B: LedgerStore,
    C: ChainClient,
{
    pub fn new(db: B, chain: C, settings: SweepSettings) -> Self {
        Self { db, chain, settings }
    }

    /// Fund stage: gas out to the richest pending deposit addresses first.
    pub async fn run_fund_stage(&self) -> Result<SweepRunResult, SweepError> {
        let candidates =
            self.db.fetch_sweep_candidates(SweepStatus::NeedsFunding, self.settings.fund_batch_size).await?;
        let mut result = SweepRunResult::default();
        if candidates.is_empty() {
            return Ok(result);
        }
        let base_nonce = self.chain.pending_nonce(TreasuryWallet::Gas).await?;
        debug!("🧹️ Funding {} deposit addresses from nonce {base_nonce}", candidates.len());
        for (i, member) in candidates.iter().enumerate() {
            result.processed += 1;
            let nonce = base_nonce + i as u64;
            let sent = self
                .chain
                .send_native(TreasuryWallet::Gas, &member.deposit_address, self.settings.fund_amount_wei, Some(nonce))
                .await;
            match sent {
                Ok(fund_tx) => {
                    if self.db.mark_funding_sent(member.id, &fund_tx).await? {
                        result.advanced += 1;
                        self.db
                            .append_audit(
                                NewAuditEvent::for_member(AuditEventType::SweepFundSent, member.id).with_detail(
                                    serde_json::json!({ "fund_tx": fund_tx.as_str(), "nonce": nonce }),
                                ),
                            )
                            .await?;
                    }
                },
                Err(e) => {
                    // A failed broadcast leaves a nonce gap that would stall every later send in
                    // this run. Stop here; remaining members retry next tick.
                    warn!("🧹️ Funding broadcast for member #{} failed: {e}. Ending fund run.", member.id);
                    result.errors.push(RunError { subject_id: member.id, error: e.to_string() });
                    break;
                },
            }
        }
        Ok(result)
    }

    /// Dispatch stage: once gas has arrived, broadcast the USDC sweep itself.
    pub async fn run_dispatch_stage(&self) -> Result<SweepRunResult, SweepError> {
        let candidates =
            self.db.fetch_sweep_candidates(SweepStatus::FundingSent, self.settings.dispatch_batch_size).await?;
        let mut result = SweepRunResult::default();
        for member in &candidates {
            result.processed += 1;
            match self.dispatch_one(member).await {
                Ok(true) => result.advanced += 1,
                Ok(false) => result.pending += 1,
                Err(e) => {
                    warn!("🧹️ Sweep dispatch failed for member #{}: {e}", member.id);
                    result.errors.push(RunError { subject_id: member.id, error: e.to_string() });
                },
            }
        }
        Ok(result)
    }

    async fn dispatch_one(&self, member: &MemberAccount) -> Result<bool, SweepError> {
        let gas = self.chain.native_balance(&member.deposit_address).await?;
        if gas < self.settings.min_gas_wei {
            // Funding is still in flight; leave the state for the next run.
            return Ok(false);
        }
        let balance = self.chain.usdc_balance(&member.deposit_address).await?;
        if balance.is_zero() {
            // Nothing left to sweep (already moved, or dust below a unit). Close the cycle out.
            let _ = self.db.mark_sweeping(member.id, &TxHash::from("")).await?;
            let _ = self.db.mark_sweep_complete(member.id).await?;
            return Ok(true);
        }
        let sweep_tx = self
            .chain
            .sweep_usdc(member.derivation_index, &member.deposit_address, &self.settings.treasury_address, balance)
            .await?;
        if self.db.mark_sweeping(member.id, &sweep_tx).await? {
            self.db
                .append_audit(
                    NewAuditEvent::for_member(AuditEventType::SweepDispatched, member.id)
                        .with_amount(balance)
                        .with_detail(serde_json::json!({ "sweep_tx": sweep_tx.as_str() })),
                )
                .await?;
        }
        Ok(true)
    }

    /// Verify stage: poll receipts for in-flight sweeps.
    pub async fn run_verify_stage(&self) -> Result<SweepRunResult, SweepError> {
        let candidates =
            self.db.fetch_sweep_candidates(SweepStatus::Sweeping, self.settings.verify_batch_size).await?;
        let mut result = SweepRunResult::default();
        for member in &candidates {
            result.processed += 1;
            let Some(sweep_tx) = member.sweep_tx.clone() else {
                // Should not happen: Sweeping implies a recorded hash. Park it for ops.
                self.db.mark_sweep_failed(member.id, "Sweeping without a recorded sweep tx").await?;
                result.failed += 1;
                continue;
            };
            match self.chain.transaction_receipt(&sweep_tx).await {
                Ok(None) => {
                    result.pending += 1;
                    let attempts = self.db.increment_sweep_verify_attempts(member.id).await?;
                    if self.settings.max_verify_attempts > 0 && attempts >= self.settings.max_verify_attempts {
                        let msg = format!("Sweep {sweep_tx} unconfirmed after {attempts} polls");
                        self.db.mark_sweep_failed(member.id, &msg).await?;
                        self.db
                            .append_audit(
                                NewAuditEvent::for_member(AuditEventType::SweepFailed, member.id)
                                    .with_detail(serde_json::json!({ "sweep_tx": sweep_tx.as_str(), "reason": msg })),
                            )
                            .await?;
                        result.failed += 1;
                    }
                },
                Ok(Some(receipt)) if receipt.success => {
                    if self.db.mark_sweep_complete(member.id).await? {
                        result.advanced += 1;
                        self.db
                            .append_audit(
                                NewAuditEvent::for_member(AuditEventType::DepositSwept, member.id)
                                    .with_amount(member.sweep_balance)
                                    .with_detail(serde_json::json!({
                                        "sweep_tx": sweep_tx.as_str(),
                                        "block": receipt.block_number,
                                    })),
                            )
                            .await?;
                        info!("🧹️ Sweep of {} for member #{} confirmed", member.sweep_balance, member.id);
                    }
                },
                Ok(Some(receipt)) => {
                    let msg = format!("Sweep transaction {sweep_tx} reverted on chain");
                    self.db.mark_sweep_failed(member.id, &msg).await?;
                    self.db
                        .append_audit(
                            NewAuditEvent::for_member(AuditEventType::SweepFailed, member.id).with_detail(
                                serde_json::json!({ "sweep_tx": sweep_tx.as_str(), "block": receipt.block_number }),
                            ),
                        )
                        .await?;
                    result.failed += 1;
                },
                Err(e) => {
                    // Transient RPC trouble: state untouched, retried next run.
                    result.errors.push(RunError { subject_id: member.id, error: e.to_string() });
                },
            }
        }
        Ok(result)
    }
}
