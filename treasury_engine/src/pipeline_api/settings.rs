//! Tunables for the pipelines. Every knob has a production default; the server overrides them
//! from the environment. Rates are basis points so they survive config round-trips exactly.

use chrono::Duration;
use trs_common::MicroUsdc;

use crate::db_types::{MemberAccount, PaymentKind, WalletAddress};

#[derive(Clone, Debug)]
pub struct PricingSettings {
    /// One-off membership unlock price.
    pub initial_unlock: MicroUsdc,
    pub monthly: MicroUsdc,
    pub weekly: MicroUsdc,
    /// Referrer's share of the unlock price.
    pub direct_bonus_bps: i64,
    /// Referrer's share of each subscription payment.
    pub residual_bps: i64,
    /// Underpayment tolerance relative to the expected amount.
    pub tolerance_bps: i64,
    /// On-chain funds below this are left unrecorded (dust guard).
    pub min_recordable_deposit: MicroUsdc,
    /// Members examined per monitor invocation, bounding the run under serverless deadlines.
    pub monitor_batch_size: u32,
    pub intent_ttl: Duration,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            initial_unlock: MicroUsdc::from_whole(500),
            monthly: MicroUsdc::from_whole(199),
            weekly: MicroUsdc::from_whole(59),
            direct_bonus_bps: 4_990,
            residual_bps: 1_000,
            tolerance_bps: 100,
            min_recordable_deposit: MicroUsdc::from_whole(1),
            monitor_batch_size: 100,
            intent_ttl: Duration::hours(48),
        }
    }
}

impl PricingSettings {
    pub fn expected_amount(&self, kind: PaymentKind) -> MicroUsdc {
        match kind {
            PaymentKind::Initial => self.initial_unlock,
            PaymentKind::Monthly => self.monthly,
            PaymentKind::Weekly => self.weekly,
        }
    }

    pub fn expected_for(&self, member: &MemberAccount) -> MicroUsdc {
        self.expected_amount(member.expected_payment_kind())
    }
}

#[derive(Clone, Debug)]
pub struct PayoutSettings {
    /// Commissions below this never enter a batch; referrer totals below it are also excluded.
    pub min_payout: MicroUsdc,
    /// Commissions examined per batcher invocation.
    pub batch_page_size: u32,
    /// Commissions paid per executor invocation.
    pub executor_page_size: u32,
    /// Fixed fiat processing fee deducted from the gross amount before a Stripe transfer.
    pub stripe_fee_bps: i64,
    /// Gas units a single ERC-20 transfer is budgeted at.
    pub gas_per_transfer: u64,
}

impl Default for PayoutSettings {
    fn default() -> Self {
        Self {
            min_payout: MicroUsdc::from_whole(10),
            batch_page_size: 500,
            executor_page_size: 50,
            stripe_fee_bps: 350,
            gas_per_transfer: 65_000,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SweepSettings {
    /// Where swept custodial balances land.
    pub treasury_address: WalletAddress,
    /// Native token sent to a deposit address so it can pay for its own sweep.
    pub fund_amount_wei: u128,
    /// Gas considered "arrived" at the deposit address before dispatching the sweep.
    pub min_gas_wei: u128,
    pub fund_batch_size: u32,
    pub dispatch_batch_size: u32,
    pub verify_batch_size: u32,
    /// Receipt polls before a sweep is declared stuck. Zero keeps polling forever.
    pub max_verify_attempts: i64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            // Placeholder burn address; deployments must configure the real treasury.
            treasury_address: WalletAddress::new("0x000000000000000000000000000000000000dead")
                .expect("constant address is valid"),
            fund_amount_wei: 30_000_000_000_000_000, // 0.03 native token
            min_gas_wei: 10_000_000_000_000_000,
            fund_batch_size: 20,
            dispatch_batch_size: 20,
            verify_batch_size: 50,
            max_verify_attempts: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TreasurySettings {
    pub gas_warning_wei: u128,
    pub gas_critical_wei: u128,
    pub payout_warning: MicroUsdc,
    pub payout_critical: MicroUsdc,
    /// Average total cost of one payout transaction, used for the remaining-transactions figure.
    pub avg_tx_cost_wei: u128,
}

impl Default for TreasurySettings {
    fn default() -> Self {
        Self {
            gas_warning_wei: 5_000_000_000_000_000_000,  // 5 native tokens
            gas_critical_wei: 1_000_000_000_000_000_000, // 1 native token
            payout_warning: MicroUsdc::from_whole(5_000),
            payout_critical: MicroUsdc::from_whole(1_000),
            avg_tx_cost_wei: 10_000_000_000_000_000,
        }
    }
}
