//! Result objects returned by the ledger traits.

use serde::{Deserialize, Serialize};

use crate::db_types::{Commission, Payment};

/// Where a member landed in the network tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionAssignment {
    pub level: i64,
    pub position: i64,
    pub position_id: String,
    pub parent_position_id: Option<String>,
}

/// What the initial-unlock transaction did.
#[derive(Debug, Clone)]
pub struct InitialUnlockOutcome {
    pub payment: Payment,
    /// The referrer's direct-bonus commission, when the member has a referrer.
    pub commission: Option<Commission>,
    /// Number of upline ancestors whose active-member counter was bumped.
    pub ancestors_credited: u64,
}

/// What the subscription-renewal transaction did.
#[derive(Debug, Clone)]
pub struct SubscriptionOutcome {
    pub payment: Payment,
    pub commission: Option<Commission>,
    /// Number of upline ancestors credited with downline volume.
    pub ancestors_credited: u64,
}

/// Outcome of the one-way paid transition on a commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkPaidOutcome {
    Paid,
    /// The commission was not `Pending`; nothing was changed. A second payout attempt against a
    /// paid commission is a no-op, never a re-pay.
    AlreadyPaid,
}
