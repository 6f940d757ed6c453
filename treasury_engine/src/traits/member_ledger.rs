use trs_common::MicroUsdc;

use crate::{
    db_types::{MemberAccount, NewMember, SweepStatus, TxHash, WalletAddress},
    traits::{data_objects::PositionAssignment, LedgerError},
};

/// Member-side ledger operations: reads for the monitor loops, the idempotent network placement,
/// and the sweep status machine. Sweep transitions are single-field compare-and-swap updates;
/// every method that advances `sweep_status` returns `false` when the member was not in the
/// expected source state, so overlapping cron runs cannot double-drive a stage.
#[allow(async_fn_in_trait)]
pub trait MemberLedger: Clone {
    async fn fetch_member(&self, member_id: i64) -> Result<Option<MemberAccount>, LedgerError>;

    /// Inserts a member row. Registration lives outside this crate; the engine's tests and
    /// operational tooling seed the ledger through this.
    async fn insert_member(&self, member: NewMember) -> Result<MemberAccount, LedgerError>;

    /// Members with a custodial deposit address, in id order, starting after `after_id`.
    /// The deposit monitor pages through these with a per-run cap.
    async fn fetch_billable_members(&self, after_id: i64, limit: u32) -> Result<Vec<MemberAccount>, LedgerError>;

    /// Assigns the member's network position under their referrer, breadth-first within the
    /// referrer's subtree. Idempotent: returns `None` without touching anything if the member
    /// already holds a position. Requires the referrer to hold one (root/bypass members are
    /// placed at the root).
    async fn assign_network_position(&self, member_id: i64) -> Result<Option<PositionAssignment>, LedgerError>;

    async fn update_payout_destination(
        &self,
        member_id: i64,
        wallet: Option<WalletAddress>,
        stripe_connect_id: Option<String>,
    ) -> Result<(), LedgerError>;

    async fn set_qualified(&self, member_id: i64, qualified: bool) -> Result<(), LedgerError>;

    /// Members currently in the given sweep state. `NeedsFunding` candidates come back ordered
    /// by recorded custodial balance, highest first.
    async fn fetch_sweep_candidates(&self, status: SweepStatus, limit: u32) -> Result<Vec<MemberAccount>, LedgerError>;

    /// `Idle -> NeedsFunding`, recording the custodial balance that triggered the sweep.
    async fn mark_needs_funding(&self, member_id: i64, balance: MicroUsdc) -> Result<bool, LedgerError>;

    /// `NeedsFunding -> FundingSent`, recording the gas funding tx hash.
    async fn mark_funding_sent(&self, member_id: i64, fund_tx: &TxHash) -> Result<bool, LedgerError>;

    /// `FundingSent -> Sweeping`, recording the sweep tx hash.
    async fn mark_sweeping(&self, member_id: i64, sweep_tx: &TxHash) -> Result<bool, LedgerError>;

    /// `Sweeping -> Idle` on a successful receipt; clears tx hashes and stamps `last_swept_at`.
    async fn mark_sweep_complete(&self, member_id: i64) -> Result<bool, LedgerError>;

    /// Any state `-> Failed` with a descriptive error. Failed members are excluded from all
    /// stages until an operator intervenes.
    async fn mark_sweep_failed(&self, member_id: i64, error: &str) -> Result<bool, LedgerError>;

    /// Bumps the verify-attempt counter for a still-pending sweep receipt.
    async fn increment_sweep_verify_attempts(&self, member_id: i64) -> Result<i64, LedgerError>;
}
