use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use trs_common::MicroUsdc;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {0}: {1}")]
pub struct ConversionError(pub &'static str, pub String);

//--------------------------------------    WalletAddress    ---------------------------------------------------------
/// A lightweight wrapper around a 0x-prefixed EVM address string. Addresses are normalised to
/// lowercase so that string equality matches on-chain equality.
#[derive(Clone, Debug, Type, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConversionError> {
        let value = value.into().to_lowercase();
        if value.len() == 42 && value.starts_with("0x") && value[2..].chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(value))
        } else {
            Err(ConversionError("WalletAddress", value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WalletAddress {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

//--------------------------------------       TxHash        ---------------------------------------------------------
#[derive(Clone, Debug, Type, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct TxHash(pub String);

impl Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for TxHash {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl TxHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   PaymentSchedule   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentSchedule {
    Weekly,
    Monthly,
}

impl PaymentSchedule {
    /// Short code used in period keys, e.g. `m-20260801`.
    pub fn code(&self) -> &'static str {
        match self {
            PaymentSchedule::Weekly => "w",
            PaymentSchedule::Monthly => "m",
        }
    }
}

impl Display for PaymentSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentSchedule::Weekly => write!(f, "Weekly"),
            PaymentSchedule::Monthly => write!(f, "Monthly"),
        }
    }
}

impl FromStr for PaymentSchedule {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Weekly" => Ok(Self::Weekly),
            "Monthly" => Ok(Self::Monthly),
            s => Err(ConversionError("PaymentSchedule", s.to_string())),
        }
    }
}

//--------------------------------------    PaymentKind      ---------------------------------------------------------
/// What an incoming payment is for. `Initial` unlocks the membership; the other two renew it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentKind {
    Initial,
    Weekly,
    Monthly,
}

impl PaymentKind {
    pub fn for_subscription(schedule: PaymentSchedule) -> Self {
        match schedule {
            PaymentSchedule::Weekly => PaymentKind::Weekly,
            PaymentSchedule::Monthly => PaymentKind::Monthly,
        }
    }

    pub fn is_initial(&self) -> bool {
        matches!(self, PaymentKind::Initial)
    }
}

impl Display for PaymentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentKind::Initial => write!(f, "Initial"),
            PaymentKind::Weekly => write!(f, "Weekly"),
            PaymentKind::Monthly => write!(f, "Monthly"),
        }
    }
}

//--------------------------------------    SweepStatus      ---------------------------------------------------------
/// Per-user sweep pipeline state. Each cron stage owns exactly one status value, so a user can
/// only ever be acted on by one stage at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum SweepStatus {
    #[default]
    Idle,
    NeedsFunding,
    FundingSent,
    Sweeping,
    Failed,
}

impl Display for SweepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SweepStatus::Idle => write!(f, "Idle"),
            SweepStatus::NeedsFunding => write!(f, "NeedsFunding"),
            SweepStatus::FundingSent => write!(f, "FundingSent"),
            SweepStatus::Sweeping => write!(f, "Sweeping"),
            SweepStatus::Failed => write!(f, "Failed"),
        }
    }
}

//--------------------------------------    IntentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum IntentStatus {
    Created,
    AwaitingFunds,
    Processing,
    Completed,
    Expired,
    Failed,
}

impl Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntentStatus::Created => write!(f, "Created"),
            IntentStatus::AwaitingFunds => write!(f, "AwaitingFunds"),
            IntentStatus::Processing => write!(f, "Processing"),
            IntentStatus::Completed => write!(f, "Completed"),
            IntentStatus::Expired => write!(f, "Expired"),
            IntentStatus::Failed => write!(f, "Failed"),
        }
    }
}

//--------------------------------------   CommissionStatus  ---------------------------------------------------------
/// `Pending -> Paid` is one-way. A commission is never moved back out of `Paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum CommissionStatus {
    Pending,
    Paid,
    Failed,
}

impl Display for CommissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommissionStatus::Pending => write!(f, "Pending"),
            CommissionStatus::Paid => write!(f, "Paid"),
            CommissionStatus::Failed => write!(f, "Failed"),
        }
    }
}

//--------------------------------------   CommissionType    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum CommissionType {
    DirectBonus,
    Residual,
}

impl Display for CommissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommissionType::DirectBonus => write!(f, "DirectBonus"),
            CommissionType::Residual => write!(f, "Residual"),
        }
    }
}

//--------------------------------------       TxType        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TxType {
    Deposit,
    Payout,
    PaymentIn,
    Withdrawal,
}

impl Display for TxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxType::Deposit => write!(f, "Deposit"),
            TxType::Payout => write!(f, "Payout"),
            TxType::PaymentIn => write!(f, "PaymentIn"),
            TxType::Withdrawal => write!(f, "Withdrawal"),
        }
    }
}

//--------------------------------------      TxStatus       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TxStatus {
    Confirmed,
    Failed,
}

impl Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxStatus::Confirmed => write!(f, "Confirmed"),
            TxStatus::Failed => write!(f, "Failed"),
        }
    }
}

//--------------------------------------    MemberAccount    ---------------------------------------------------------
/// A member row as the treasury pipelines see it. Registration and profile management live
/// elsewhere; this crate only reads members and advances their payment / network / sweep state.
#[derive(Debug, Clone, FromRow)]
pub struct MemberAccount {
    pub id: i64,
    pub email: String,
    /// Permanent custodial deposit address, derived from the treasury xpub at `derivation_index`.
    pub deposit_address: WalletAddress,
    pub derivation_index: i64,
    pub initial_payment_completed: bool,
    pub bypass_initial_payment: bool,
    pub is_active: bool,
    pub payment_schedule: PaymentSchedule,
    pub previous_payment_due_date: Option<DateTime<Utc>>,
    pub next_payment_due_date: Option<DateTime<Utc>>,
    pub referrer_id: Option<i64>,
    pub network_level: Option<i64>,
    pub network_position: Option<i64>,
    pub position_id: Option<String>,
    pub parent_position_id: Option<String>,
    /// Number of active members anywhere in this member's downline subtree.
    pub active_downline_count: i64,
    /// Subscription volume accumulated from the member's downline.
    pub downline_volume: MicroUsdc,
    pub payout_wallet: Option<WalletAddress>,
    pub stripe_connect_id: Option<String>,
    pub qualified: bool,
    pub sweep_status: SweepStatus,
    /// Custodial balance observed when the member was queued for sweeping. Used to order the
    /// funding stage, highest first.
    pub sweep_balance: MicroUsdc,
    pub sweep_fund_tx: Option<TxHash>,
    pub sweep_tx: Option<TxHash>,
    pub sweep_error: Option<String>,
    pub sweep_verify_attempts: i64,
    pub last_swept_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemberAccount {
    /// Which payment the member owes next. Members that have unlocked (or bypassed the unlock)
    /// owe a subscription payment priced by their schedule.
    pub fn expected_payment_kind(&self) -> PaymentKind {
        if !self.initial_payment_completed && !self.bypass_initial_payment {
            PaymentKind::Initial
        } else {
            PaymentKind::for_subscription(self.payment_schedule)
        }
    }

    pub fn has_network_position(&self) -> bool {
        self.position_id.is_some()
    }
}

/// Seed row for a member. Inserted by the registration system, which is outside this crate;
/// the engine's tests and tooling use it to populate the ledger.
#[derive(Debug, Clone)]
pub struct NewMember {
    pub email: String,
    pub deposit_address: WalletAddress,
    pub derivation_index: i64,
    pub payment_schedule: PaymentSchedule,
    pub referrer_id: Option<i64>,
    pub bypass_initial_payment: bool,
}

//--------------------------------------   UsdcTransaction   ---------------------------------------------------------
/// An immutable record of a confirmed on-chain transfer. Rows are append-only; the single
/// permitted update is attaching `related_payment_id` once the deposit has been credited.
#[derive(Debug, Clone, FromRow)]
pub struct UsdcTransaction {
    pub id: i64,
    pub member_id: i64,
    pub tx_type: TxType,
    pub amount: MicroUsdc,
    pub from_address: Option<WalletAddress>,
    pub to_address: Option<WalletAddress>,
    pub tx_hash: Option<TxHash>,
    pub status: TxStatus,
    pub related_payment_id: Option<i64>,
    pub related_commission_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUsdcTransaction {
    pub member_id: i64,
    pub tx_type: TxType,
    pub amount: MicroUsdc,
    pub from_address: Option<WalletAddress>,
    pub to_address: Option<WalletAddress>,
    pub tx_hash: Option<TxHash>,
    pub status: TxStatus,
    pub related_commission_id: Option<i64>,
}

impl NewUsdcTransaction {
    pub fn deposit(member_id: i64, amount: MicroUsdc, to_address: WalletAddress) -> Self {
        Self {
            member_id,
            tx_type: TxType::Deposit,
            amount,
            from_address: None,
            to_address: Some(to_address),
            tx_hash: None,
            status: TxStatus::Confirmed,
            related_commission_id: None,
        }
    }

    pub fn payout(
        member_id: i64,
        amount: MicroUsdc,
        from: WalletAddress,
        to: WalletAddress,
        tx_hash: TxHash,
        commission_id: i64,
    ) -> Self {
        Self {
            member_id,
            tx_type: TxType::Payout,
            amount,
            from_address: Some(from),
            to_address: Some(to),
            tx_hash: Some(tx_hash),
            status: TxStatus::Confirmed,
            related_commission_id: Some(commission_id),
        }
    }
}

//--------------------------------------    PaymentIntent    ---------------------------------------------------------
/// An expected incoming payment. Exactly one active intent drives one processor run; all status
/// transitions go through the compare-and-swap in the payment ledger.
#[derive(Debug, Clone, FromRow)]
pub struct PaymentIntent {
    pub id: i64,
    pub member_id: i64,
    pub kind: PaymentKind,
    pub amount: MicroUsdc,
    pub period_key: String,
    pub status: IntentStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       Payment       ---------------------------------------------------------
/// A completed payment. `UNIQUE(member_id, period_key)` in the schema makes creation idempotent
/// per billing period, replacing any time-window duplicate heuristics.
#[derive(Debug, Clone, FromRow)]
pub struct Payment {
    pub id: i64,
    pub member_id: i64,
    pub kind: PaymentKind,
    pub amount: MicroUsdc,
    pub period_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub member_id: i64,
    pub kind: PaymentKind,
    pub amount: MicroUsdc,
    pub period_key: String,
}

//--------------------------------------      Commission     ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct Commission {
    pub id: i64,
    /// The member being paid.
    pub referrer_id: i64,
    /// The member whose payment generated this commission.
    pub source_member_id: i64,
    pub commission_type: CommissionType,
    pub amount: MicroUsdc,
    pub status: CommissionStatus,
    pub retry_count: i64,
    pub error_message: Option<String>,
    pub payout_batch_id: Option<i64>,
    pub payout_method: Option<String>,
    pub payout_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCommission {
    pub referrer_id: i64,
    pub source_member_id: i64,
    pub commission_type: CommissionType,
    pub amount: MicroUsdc,
}

//--------------------------------------     PayoutBatch     ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct PayoutBatch {
    pub id: i64,
    pub name: String,
    pub batch_type: CommissionType,
    pub total_amount: MicroUsdc,
    pub payout_count: i64,
    /// Estimated gas for the whole batch, in wei, serialised as a decimal string.
    pub gas_estimate_wei: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayoutBatch {
    pub name: String,
    pub batch_type: CommissionType,
    pub total_amount: MicroUsdc,
    pub payout_count: i64,
    pub gas_estimate_wei: String,
}

//--------------------------------------      AuditEvent     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum AuditEventType {
    DepositDetected,
    DepositSwept,
    PayoutExecuted,
    PayoutFailed,
    BatchCreated,
    SweepFundSent,
    SweepFundCompleted,
    SweepDispatched,
    SweepFailed,
    BalanceSnapshot,
}

impl Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditEventType::DepositDetected => write!(f, "DepositDetected"),
            AuditEventType::DepositSwept => write!(f, "DepositSwept"),
            AuditEventType::PayoutExecuted => write!(f, "PayoutExecuted"),
            AuditEventType::PayoutFailed => write!(f, "PayoutFailed"),
            AuditEventType::BatchCreated => write!(f, "BatchCreated"),
            AuditEventType::SweepFundSent => write!(f, "SweepFundSent"),
            AuditEventType::SweepFundCompleted => write!(f, "SweepFundCompleted"),
            AuditEventType::SweepDispatched => write!(f, "SweepDispatched"),
            AuditEventType::SweepFailed => write!(f, "SweepFailed"),
            AuditEventType::BalanceSnapshot => write!(f, "BalanceSnapshot"),
        }
    }
}

/// Append-only event log. This is the system of record for reconstructing what happened,
/// independent of the mutable row state.
#[derive(Debug, Clone, FromRow)]
pub struct AuditEvent {
    pub id: i64,
    pub event_type: AuditEventType,
    pub member_id: Option<i64>,
    pub amount: Option<MicroUsdc>,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub event_type: AuditEventType,
    pub member_id: Option<i64>,
    pub amount: Option<MicroUsdc>,
    pub detail: serde_json::Value,
}

impl NewAuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self { event_type, member_id: None, amount: None, detail: serde_json::Value::Null }
    }

    pub fn for_member(event_type: AuditEventType, member_id: i64) -> Self {
        Self { event_type, member_id: Some(member_id), amount: None, detail: serde_json::Value::Null }
    }

    pub fn with_amount(mut self, amount: MicroUsdc) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

//--------------------------------------        Actor        ---------------------------------------------------------
/// Who triggered an execution. Recorded on every audit entry that moves money.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Cron,
    Admin(i64),
}

impl Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::Cron => write!(f, "cron"),
            Actor::Admin(id) => write!(f, "admin:{id}"),
        }
    }
}

//--------------------------------------   OutboxMessage     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OutboxStatus {
    Pending,
    Sent,
}

impl Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutboxStatus::Pending => write!(f, "Pending"),
            OutboxStatus::Sent => write!(f, "Sent"),
        }
    }
}

/// A notification waiting to be delivered. Written in the same transaction as the state change
/// it announces, so notification delivery can fail without affecting payment correctness.
#[derive(Debug, Clone, FromRow)]
pub struct OutboxMessage {
    pub id: i64,
    pub member_id: i64,
    pub kind: String,
    pub payload: String,
    pub correlation_id: String,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}
