use std::collections::HashMap;

use chrono::Utc;
use log::*;
use trs_common::MicroUsdc;

use crate::{
    db_types::{AuditEventType, Commission, CommissionType, NewAuditEvent, NewPayoutBatch},
    pipeline_api::{
        errors::PayoutError,
        objects::{BatchRunResult, BatchSummary},
        settings::PayoutSettings,
    },
    traits::{ChainClient, LedgerStore},
};

/// `PayoutBatcherApi` converts pending, unbatched commissions into executable payout batches.
///
/// Commissions split into a direct-bonus group and a residual group; within each group only
/// referrers with a payout destination on file and a per-referrer total at or above the minimum
/// payout survive. Groups with zero valid payouts never produce a batch row.
pub struct PayoutBatcherApi<B, C> {
    db: B,
    chain: C,
    settings: PayoutSettings,
}

impl<B, C> std::fmt::Debug for PayoutBatcherApi<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PayoutBatcherApi")
    }
}

impl<B, C> PayoutBatcherApi<B, C>
where
    B: LedgerStore,
    C: ChainClient,
{
    pub fn new(db: B, chain: C, settings: PayoutSettings) -> Self {
        Self { db, chain, settings }
    }

    pub async fn run(&self) -> Result<BatchRunResult, PayoutError> {
        let pending =
            self.db.fetch_pending_unbatched(self.settings.min_payout, self.settings.batch_page_size).await?;
        debug!("📦️ Batcher considering {} pending commissions", pending.len());
        let (direct, residual): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|c| c.commission_type == CommissionType::DirectBonus);

        let mut result = BatchRunResult::default();
        let direct_batch = self.build_batch(CommissionType::DirectBonus, direct, &mut result).await?;
        result.direct_bonus_batch = direct_batch;
        let residual_batch = self.build_batch(CommissionType::Residual, residual, &mut result).await?;
        result.residual_batch = residual_batch;
        Ok(result)
    }

    async fn build_batch(
        &self,
        batch_type: CommissionType,
        commissions: Vec<Commission>,
        result: &mut BatchRunResult,
    ) -> Result<Option<BatchSummary>, PayoutError> {
        if commissions.is_empty() {
            return Ok(None);
        }
        // Per-referrer totals, then destination / minimum filters.
        let mut by_referrer: HashMap<i64, Vec<&Commission>> = HashMap::new();
        for c in &commissions {
            by_referrer.entry(c.referrer_id).or_default().push(c);
        }
        let mut eligible: Vec<i64> = Vec::new();
        let mut total = MicroUsdc::default();
        let mut payout_count = 0i64;
        for (referrer_id, group) in &by_referrer {
            let member = self
                .db
                .fetch_member(*referrer_id)
                .await?
                .ok_or(crate::traits::LedgerError::MemberNotFound(*referrer_id))?;
            if member.payout_wallet.is_none() && member.stripe_connect_id.is_none() {
                trace!("📦️ Referrer #{referrer_id} has no payout destination; leaving commissions unbatched");
                result.skipped_no_destination += group.len() as u32;
                continue;
            }
            let referrer_total: MicroUsdc = group.iter().map(|c| c.amount).sum();
            if referrer_total < self.settings.min_payout {
                result.skipped_below_minimum += group.len() as u32;
                continue;
            }
            eligible.extend(group.iter().map(|c| c.id));
            total = total + referrer_total;
            payout_count += 1;
        }
        if eligible.is_empty() {
            debug!("📦️ No valid {batch_type} payouts this run; not creating a batch");
            return Ok(None);
        }
        let fee = self.chain.fee_estimate().await?;
        let gas_estimate =
            (payout_count as u128) * (self.settings.gas_per_transfer as u128) * fee.max_fee_per_gas;
        let name = format!(
            "{}-{}",
            match batch_type {
                CommissionType::DirectBonus => "direct-bonus",
                CommissionType::Residual => "residual",
            },
            Utc::now().format("%Y%m%d")
        );
        let (batch, assigned) = self
            .db
            .create_batch(
                NewPayoutBatch {
                    name,
                    batch_type,
                    total_amount: total,
                    payout_count,
                    gas_estimate_wei: gas_estimate.to_string(),
                },
                &eligible,
            )
            .await?;
        self.db
            .append_audit(NewAuditEvent::new(AuditEventType::BatchCreated).with_amount(total).with_detail(
                serde_json::json!({
                    "batch_id": batch.id,
                    "batch_type": batch_type.to_string(),
                    "commissions": assigned,
                    "payouts": payout_count,
                    "gas_estimate_wei": batch.gas_estimate_wei,
                }),
            ))
            .await?;
        info!("📦️ Created {} batch #{} with {assigned} commissions totalling {total}", batch_type, batch.id);
        Ok(Some(batch.into()))
    }
}
