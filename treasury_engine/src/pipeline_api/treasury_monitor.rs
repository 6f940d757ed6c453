use log::*;

use crate::{
    db_types::{AuditEventType, NewAuditEvent},
    pipeline_api::{
        errors::TreasuryMonitorError,
        objects::{BalanceLevel, TreasuryReport},
        settings::TreasurySettings,
    },
    traits::{AuditLedger, ChainClient, Notification, TreasuryWallet},
};

/// `TreasuryMonitorApi` watches the operational wallets: the gas tank's native balance and the
/// payout wallet's USDC balance. Every run appends a balance snapshot to the audit log — the
/// continuous time series — and warning/critical levels additionally push an alert
/// notification. Alert frequency is bounded by the cron schedule, not by internal dedup.
pub struct TreasuryMonitorApi<B, C> {
    db: B,
    chain: C,
    settings: TreasurySettings,
}

impl<B, C> std::fmt::Debug for TreasuryMonitorApi<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TreasuryMonitorApi")
    }
}

impl<B, C> TreasuryMonitorApi<B, C>
where
    B: AuditLedger,
    C: ChainClient,
{
    pub fn new(db: B, chain: C, settings: TreasurySettings) -> Self {
        Self { db, chain, settings }
    }

    pub async fn run(&self) -> Result<TreasuryReport, TreasuryMonitorError> {
        let gas_address = self.chain.wallet_address(TreasuryWallet::Gas).clone();
        let payout_address = self.chain.wallet_address(TreasuryWallet::Payout).clone();
        let gas_balance = self.chain.native_balance(&gas_address).await?;
        let payout_balance = self.chain.usdc_balance(&payout_address).await?;

        let gas_level = if gas_balance < self.settings.gas_critical_wei {
            BalanceLevel::Critical
        } else if gas_balance < self.settings.gas_warning_wei {
            BalanceLevel::Warning
        } else {
            BalanceLevel::Ok
        };
        let payout_level = if payout_balance < self.settings.payout_critical {
            BalanceLevel::Critical
        } else if payout_balance < self.settings.payout_warning {
            BalanceLevel::Warning
        } else {
            BalanceLevel::Ok
        };
        let estimated_remaining_txs =
            u64::try_from(gas_balance / self.settings.avg_tx_cost_wei.max(1)).unwrap_or(u64::MAX);

        // The snapshot goes in every run, alert or not.
        self.db
            .append_audit(NewAuditEvent::new(AuditEventType::BalanceSnapshot).with_detail(serde_json::json!({
                "gas_wallet": gas_address.as_str(),
                "gas_balance_wei": gas_balance.to_string(),
                "gas_level": gas_level.to_string(),
                "payout_wallet": payout_address.as_str(),
                "payout_balance_micro": payout_balance.value(),
                "payout_level": payout_level.to_string(),
                "estimated_remaining_txs": estimated_remaining_txs,
            })))
            .await?;

        let mut alerts_sent = 0;
        if gas_level != BalanceLevel::Ok {
            warn!("⛽️ Gas tank {gas_address} is {gas_level}: {gas_balance} wei (~{estimated_remaining_txs} txs left)");
            self.db
                .enqueue_notification(
                    0,
                    &Notification::BalanceAlert {
                        wallet: gas_address.to_string(),
                        level: gas_level.to_string(),
                        balance: format!("{gas_balance} wei"),
                    },
                    "treasury-monitor",
                )
                .await?;
            alerts_sent += 1;
        }
        if payout_level != BalanceLevel::Ok {
            warn!("⛽️ Payout wallet {payout_address} is {payout_level}: {payout_balance}");
            self.db
                .enqueue_notification(
                    0,
                    &Notification::BalanceAlert {
                        wallet: payout_address.to_string(),
                        level: payout_level.to_string(),
                        balance: payout_balance.to_string(),
                    },
                    "treasury-monitor",
                )
                .await?;
            alerts_sent += 1;
        }

        Ok(TreasuryReport {
            gas_balance_wei: gas_balance.to_string(),
            gas_level,
            estimated_remaining_txs,
            payout_balance,
            payout_level,
            alerts_sent,
        })
    }
}
