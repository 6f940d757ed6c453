use crate::{
    db_types::{AuditEvent, AuditEventType, NewAuditEvent, OutboxMessage},
    traits::{LedgerError, Notification},
};

/// Append-only audit log and the notification outbox.
#[allow(async_fn_in_trait)]
pub trait AuditLedger: Clone {
    async fn append_audit(&self, event: NewAuditEvent) -> Result<i64, LedgerError>;

    /// Most recent audit events of the given type, newest first.
    async fn fetch_audit_events(&self, event_type: AuditEventType, limit: u32) -> Result<Vec<AuditEvent>, LedgerError>;

    /// Queues a notification for delivery. Composite ledger operations write their outbox rows
    /// inside their own transactions; this standalone insert serves the paths that are not part
    /// of a larger transition (payout failures, balance alerts).
    async fn enqueue_notification(
        &self,
        member_id: i64,
        notification: &Notification,
        correlation_id: &str,
    ) -> Result<i64, LedgerError>;

    async fn fetch_pending_outbox(&self, limit: u32) -> Result<Vec<OutboxMessage>, LedgerError>;

    /// Marks an outbox row delivered. Only rows still `Pending` are affected, so a concurrent
    /// drain cannot double-send and then double-mark.
    async fn mark_outbox_sent(&self, outbox_id: i64) -> Result<bool, LedgerError>;
}
