use chrono::{DateTime, Utc};
use thiserror::Error;
use trs_common::MicroUsdc;

use crate::{
    db_types::{
        IntentStatus,
        NewUsdcTransaction,
        Payment,
        PaymentIntent,
        PaymentKind,
        TxHash,
        UsdcTransaction,
        WalletAddress,
    },
    traits::data_objects::{InitialUnlockOutcome, SubscriptionOutcome},
};

/// Payment-side ledger operations: deposit transactions, payment intents and the two composite
/// payment transitions. The composites run as single database transactions so that a crash or a
/// duplicate invocation can never leave due dates and payment rows disagreeing.
#[allow(async_fn_in_trait)]
pub trait PaymentLedger: Clone {
    /// Sum of confirmed deposit transactions for the member recorded after `cutoff`.
    async fn sum_deposits_since(&self, member_id: i64, cutoff: DateTime<Utc>) -> Result<MicroUsdc, LedgerError>;

    /// Lifetime sum of recorded deposit transactions credited to the given custodial address.
    /// Compared against the live on-chain balance to find unrecorded funds.
    async fn total_recorded_for_address(&self, address: &WalletAddress) -> Result<MicroUsdc, LedgerError>;

    /// Records a confirmed on-chain transfer (deposit or payout). For deposits the insert must
    /// commit before any crediting happens; callers abort the member's run if this fails.
    async fn record_transaction(&self, tx: NewUsdcTransaction) -> Result<UsdcTransaction, LedgerError>;

    /// Attaches a payment id to the member's unlinked deposit transactions. The one permitted
    /// update on the append-only transaction table.
    async fn link_deposits_to_payment(&self, member_id: i64, payment_id: i64) -> Result<u64, LedgerError>;

    /// Returns the member's intent for `period_key`, creating it in `AwaitingFunds` if absent.
    async fn fetch_or_create_intent(
        &self,
        member_id: i64,
        kind: PaymentKind,
        amount: MicroUsdc,
        period_key: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PaymentIntent, LedgerError>;

    /// Atomic compare-and-swap on intent status. Returns `false` when the intent was not in any
    /// of the `from` states — meaning another run already owns the transition, which callers
    /// must treat as "someone else is handling it", not as an error.
    async fn update_intent_if_status_in(
        &self,
        intent_id: i64,
        from: &[IntentStatus],
        to: IntentStatus,
    ) -> Result<bool, LedgerError>;

    /// Expires intents whose `expires_at` has passed while still awaiting funds.
    async fn expire_stale_intents(&self, now: DateTime<Utc>) -> Result<u64, LedgerError>;

    async fn fetch_payment_by_period(&self, member_id: i64, period_key: &str)
        -> Result<Option<Payment>, LedgerError>;

    /// The initial-unlock transition, in one transaction:
    /// marks the member unlocked and active, sets the anchored due dates, bumps the
    /// active-member counter of every upline ancestor (only when the member was previously
    /// inactive), inserts the `Initial` payment, creates the referrer's direct-bonus commission
    /// and writes the outbox notification row.
    ///
    /// Idempotent via the payment's `(member_id, period_key)` uniqueness: a second invocation
    /// returns [`LedgerError::PaymentAlreadyRecorded`] and mutates nothing.
    async fn complete_initial_unlock(
        &self,
        member_id: i64,
        amount: MicroUsdc,
        previous_due: DateTime<Utc>,
        next_due: DateTime<Utc>,
        direct_bonus: Option<MicroUsdc>,
        correlation_id: &str,
    ) -> Result<InitialUnlockOutcome, LedgerError>;

    /// The subscription-renewal transition, in one transaction:
    /// rolls `previous_payment_due_date` forward to the prior `next_payment_due_date`, sets the
    /// new next due date, inserts the period's payment, distributes the amount up the member's
    /// ancestor chain as downline volume, creates the residual commission and writes the outbox
    /// row. Keyed by `period_key`; a duplicate invocation returns
    /// [`LedgerError::PaymentAlreadyRecorded`] with due dates untouched.
    async fn complete_subscription_period(
        &self,
        member_id: i64,
        amount: MicroUsdc,
        period_key: &str,
        fallback_previous: DateTime<Utc>,
        next_due: DateTime<Utc>,
        residual: Option<MicroUsdc>,
        correlation_id: &str,
    ) -> Result<SubscriptionOutcome, LedgerError>;
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The requested member {0} does not exist")]
    MemberNotFound(i64),
    #[error("The requested commission {0} does not exist")]
    CommissionNotFound(i64),
    #[error("The requested payment intent {0} does not exist")]
    IntentNotFound(i64),
    #[error("A payment for member {member_id} and period {period_key} is already recorded")]
    PaymentAlreadyRecorded { member_id: i64, period_key: String },
    #[error("A deposit with tx hash {0} is already recorded")]
    DepositAlreadyRecorded(TxHash),
    #[error("Member {0} has a referrer without a network position")]
    ReferrerHasNoPosition(i64),
    #[error("No free slot in the referrer's subtree for member {0}")]
    NetworkSubtreeFull(i64),
    #[error("Commission {0} is not in a payable state")]
    CommissionNotPayable(i64),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}
