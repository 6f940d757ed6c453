use serde::{Deserialize, Serialize};
use thiserror::Error;
use trs_common::MicroUsdc;

use crate::db_types::PaymentKind;

/// The notifications the pipelines emit. Rendering (email/SMS templates) happens on the other
/// side of the [`NotificationSender`] boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    PaymentReceived { amount: MicroUsdc, payment_kind: PaymentKind },
    DirectBonus { amount: MicroUsdc },
    PayoutProcessed { amount: MicroUsdc, method: String },
    PayoutFailed { amount: MicroUsdc, reason: String },
    BalanceAlert { wallet: String, level: String, balance: String },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::PaymentReceived { .. } => "payment_received",
            Notification::DirectBonus { .. } => "direct_bonus",
            Notification::PayoutProcessed { .. } => "payout_processed",
            Notification::PayoutFailed { .. } => "payout_failed",
            Notification::BalanceAlert { .. } => "balance_alert",
        }
    }
}

/// Fire-and-forget delivery boundary. Implementations talk to the email/SMS stack; failures are
/// logged by callers and never propagated into payment correctness.
#[allow(async_fn_in_trait)]
pub trait NotificationSender: Clone {
    async fn notify(
        &self,
        member_id: i64,
        notification: &Notification,
        correlation_id: &str,
    ) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Error)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);
