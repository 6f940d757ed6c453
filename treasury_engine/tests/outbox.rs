//! Outbox semantics: notification rows commit with the transitions that produced them, and
//! delivery failures never lose a message.

mod support;

use support::{new_test_ledger, seed_member, seed_referrer};
use treasury_engine::{
    db_types::OutboxStatus,
    dispatch::{DirectDispatcher, OutboxDrainApi},
    test_utils::mocks::{MockChain, MockNotifier},
    traits::AuditLedger,
    DepositMonitorApi,
    PricingSettings,
};
use trs_common::MicroUsdc;

#[tokio::test]
async fn unlock_queues_notifications_in_the_same_transaction() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let referrer = seed_referrer(&db, "referrer@example.com", 1).await;
    let member = seed_member(&db, "member@example.com", 2, Some(referrer.id)).await;
    chain.set_usdc_balance(&member.deposit_address, MicroUsdc::from_whole(500));
    DepositMonitorApi::new(db.clone(), chain.clone(), PricingSettings::default())
        .run()
        .await
        .expect("monitor run failed");

    let pending = db.fetch_pending_outbox(10).await.unwrap();
    assert!(pending.iter().any(|m| m.kind == "payment_received" && m.member_id == member.id));
    assert!(pending.iter().any(|m| m.kind == "direct_bonus" && m.member_id == referrer.id));
}

#[tokio::test]
async fn drain_delivers_and_marks_sent() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let notifier = MockNotifier::default();
    let member = seed_member(&db, "member@example.com", 2, None).await;
    chain.set_usdc_balance(&member.deposit_address, MicroUsdc::from_whole(500));
    DepositMonitorApi::new(db.clone(), chain.clone(), PricingSettings::default())
        .run()
        .await
        .expect("monitor run failed");

    let drain = OutboxDrainApi::new(db.clone(), DirectDispatcher::new(db.clone(), notifier.clone()), 50);
    let result = drain.run().await.expect("drain failed");
    assert_eq!(result.delivered, 1);
    assert_eq!(notifier.delivered().len(), 1);
    assert_eq!(notifier.delivered()[0].member_id, member.id);
    assert!(db.fetch_pending_outbox(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_delivery_leaves_the_row_pending() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let notifier = MockNotifier::default();
    notifier.fail_deliveries(true);
    let member = seed_member(&db, "member@example.com", 2, None).await;
    chain.set_usdc_balance(&member.deposit_address, MicroUsdc::from_whole(500));
    DepositMonitorApi::new(db.clone(), chain.clone(), PricingSettings::default())
        .run()
        .await
        .expect("monitor run failed");

    let drain = OutboxDrainApi::new(db.clone(), DirectDispatcher::new(db.clone(), notifier.clone()), 50);
    let result = drain.run().await.expect("drain failed");
    assert_eq!(result.failed, 1);
    assert_eq!(result.delivered, 0);

    // The payment stands; only the notification is still owed.
    let pending = db.fetch_pending_outbox(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, OutboxStatus::Pending);

    // A later drain, with delivery healthy again, sends it.
    notifier.fail_deliveries(false);
    let result = drain.run().await.expect("second drain failed");
    assert_eq!(result.delivered, 1);
}
