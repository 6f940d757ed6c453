//! Outbox draining and notification dispatch.
//!
//! State transitions write their notification rows into the outbox inside the same transaction
//! as the ledger change; this module delivers them afterwards. Delivery strategy is chosen at
//! startup: [`DirectDispatcher`] sends inline, [`QueuedDispatcher`] hands messages to a bounded
//! channel drained by a spawned worker. Either way a failed send leaves the row `Pending` for
//! the next drain — notification reliability is decoupled from payment correctness.

use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::sync::mpsc;

use crate::{
    db_types::OutboxMessage,
    pipeline_api::OutboxRunResult,
    traits::{AuditLedger, LedgerError, Notification, NotificationSender},
};

mod senders;

pub use senders::{LogNotifier, WebhookNotifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    Queued,
    Failed,
}

/// How outbox rows reach the notification sender.
#[allow(async_fn_in_trait)]
pub trait Dispatcher: Clone {
    async fn dispatch(&self, message: OutboxMessage) -> DispatchOutcome;
}

/// Decodes an outbox row's payload back into its [`Notification`]. Public so callers building a
/// [`DeliveryFn`] over concrete types can reuse it.
pub fn decode_notification(message: &OutboxMessage) -> Option<Notification> {
    match serde_json::from_str(&message.payload) {
        Ok(n) => Some(n),
        Err(e) => {
            error!("📬️ Outbox row #{} carries an undecodable payload: {e}", message.id);
            None
        },
    }
}

//--------------------------------------  DirectDispatcher   ---------------------------------------------------------

/// Sends each message inline and marks it sent on success.
pub struct DirectDispatcher<B, N> {
    db: B,
    sender: N,
}

impl<B: Clone, N: Clone> Clone for DirectDispatcher<B, N> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), sender: self.sender.clone() }
    }
}

impl<B, N> DirectDispatcher<B, N>
where
    B: AuditLedger,
    N: NotificationSender,
{
    pub fn new(db: B, sender: N) -> Self {
        Self { db, sender }
    }
}

impl<B, N> Dispatcher for DirectDispatcher<B, N>
where
    B: AuditLedger,
    N: NotificationSender,
{
    async fn dispatch(&self, message: OutboxMessage) -> DispatchOutcome {
        let Some(notification) = decode_notification(&message) else {
            return DispatchOutcome::Failed;
        };
        match self.sender.notify(message.member_id, &notification, &message.correlation_id).await {
            Ok(()) => {
                match self.db.mark_outbox_sent(message.id).await {
                    Ok(_) => DispatchOutcome::Delivered,
                    Err(e) => {
                        // The notification went out but the row stays pending; the next drain
                        // may re-send. Duplicate notifications are acceptable, lost ones not.
                        warn!("📬️ Could not mark outbox row #{} sent: {e}", message.id);
                        DispatchOutcome::Delivered
                    },
                }
            },
            Err(e) => {
                warn!("📬️ Delivery of outbox row #{} failed: {e}", message.id);
                DispatchOutcome::Failed
            },
        }
    }
}

//--------------------------------------  QueuedDispatcher   ---------------------------------------------------------

/// The delivery routine the queued worker runs for each message: decode, send, mark sent.
/// Boxed so the worker task stays `Send` regardless of which backend the closure captures;
/// callers build it over their concrete ledger and sender (see the server wiring).
pub type DeliveryFn = Arc<dyn Fn(OutboxMessage) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Hands messages to a bounded channel; a spawned worker owns delivery and bookkeeping.
#[derive(Clone)]
pub struct QueuedDispatcher {
    tx: mpsc::Sender<OutboxMessage>,
}

impl QueuedDispatcher {
    /// Starts the delivery worker and returns the dispatcher handle. The worker runs until
    /// every dispatcher clone is dropped.
    pub fn start(delivery: DeliveryFn, buffer_size: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<OutboxMessage>(buffer_size);
        tokio::spawn(async move {
            debug!("📬️ Outbox delivery worker started");
            while let Some(message) = rx.recv().await {
                let delivery = Arc::clone(&delivery);
                (delivery)(message).await;
            }
            debug!("📬️ Outbox delivery worker shut down");
        });
        Self { tx }
    }
}

impl Dispatcher for QueuedDispatcher {
    async fn dispatch(&self, message: OutboxMessage) -> DispatchOutcome {
        let id = message.id;
        match self.tx.send(message).await {
            Ok(()) => DispatchOutcome::Queued,
            Err(e) => {
                error!("📬️ Could not queue outbox row #{id}: {e}");
                DispatchOutcome::Failed
            },
        }
    }
}

//--------------------------------------    OutboxDrainApi   ---------------------------------------------------------

/// Drains pending outbox rows through the configured dispatcher. Invoked by the outbox cron.
pub struct OutboxDrainApi<B, D> {
    db: B,
    dispatcher: D,
    batch_size: u32,
}

impl<B, D> OutboxDrainApi<B, D>
where
    B: AuditLedger,
    D: Dispatcher,
{
    pub fn new(db: B, dispatcher: D, batch_size: u32) -> Self {
        Self { db, dispatcher, batch_size }
    }

    pub async fn run(&self) -> Result<OutboxRunResult, LedgerError> {
        let pending = self.db.fetch_pending_outbox(self.batch_size).await?;
        let mut result = OutboxRunResult::default();
        for message in pending {
            result.processed += 1;
            match self.dispatcher.dispatch(message).await {
                DispatchOutcome::Delivered => result.delivered += 1,
                DispatchOutcome::Queued => result.queued += 1,
                DispatchOutcome::Failed => result.failed += 1,
            }
        }
        trace!(
            "📬️ Outbox drain: {} processed, {} delivered, {} queued, {} failed",
            result.processed,
            result.delivered,
            result.queued,
            result.failed
        );
        Ok(result)
    }
}
