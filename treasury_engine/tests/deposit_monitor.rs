//! Deposit monitor behaviour: detection of unrecorded on-chain funds, period accounting, and
//! the initial-unlock side effects.

mod support;

use support::{new_test_ledger, seed_member, seed_referrer};
use treasury_engine::{
    db_types::{AuditEventType, CommissionStatus, CommissionType},
    test_utils::mocks::MockChain,
    traits::{AuditLedger, CommissionLedger, MemberLedger, PaymentLedger},
    DepositMonitorApi,
    PricingSettings,
};
use trs_common::MicroUsdc;

#[tokio::test]
async fn full_deposit_unlocks_membership_and_creates_direct_bonus() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let referrer = seed_referrer(&db, "referrer@example.com", 1).await;
    let member = seed_member(&db, "member@example.com", 2, Some(referrer.id)).await;

    chain.set_usdc_balance(&member.deposit_address, MicroUsdc::from_whole(500));
    let monitor = DepositMonitorApi::new(db.clone(), chain.clone(), PricingSettings::default());

    let result = monitor.run().await.expect("monitor run failed");
    assert_eq!(result.payments_completed, 1);
    assert_eq!(result.deposits_recorded, 1);
    assert!(result.errors.is_empty());

    let member = db.fetch_member(member.id).await.unwrap().unwrap();
    assert!(member.initial_payment_completed);
    assert!(member.is_active);
    assert!(member.previous_payment_due_date.is_some());
    assert!(member.next_payment_due_date.is_some());
    assert!(member.has_network_position());

    // $249.50 direct bonus, pending, for the referrer.
    let pending = db.fetch_pending_unbatched(MicroUsdc::from_whole(1), 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    let commission = &pending[0];
    assert_eq!(commission.referrer_id, referrer.id);
    assert_eq!(commission.commission_type, CommissionType::DirectBonus);
    assert_eq!(commission.status, CommissionStatus::Pending);
    assert_eq!(commission.amount, MicroUsdc::from_cents(24_950));

    // The deposit was recorded and linked to the payment.
    let payment = db.fetch_payment_by_period(member.id, "initial").await.unwrap().unwrap();
    assert_eq!(payment.amount, MicroUsdc::from_whole(500));
    let events = db.fetch_audit_events(AuditEventType::DepositDetected, 10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].amount, Some(MicroUsdc::from_whole(500)));
}

#[tokio::test]
async fn partial_deposit_is_recorded_as_underpaid_without_side_effects() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let referrer = seed_referrer(&db, "referrer@example.com", 1).await;
    let member = seed_member(&db, "member@example.com", 2, Some(referrer.id)).await;

    chain.set_usdc_balance(&member.deposit_address, MicroUsdc::from_whole(250));
    let monitor = DepositMonitorApi::new(db.clone(), chain.clone(), PricingSettings::default());

    let result = monitor.run().await.expect("monitor run failed");
    assert_eq!(result.payments_completed, 0);
    assert_eq!(result.deposits_recorded, 1);
    assert_eq!(result.underpaid, 1);

    let member = db.fetch_member(member.id).await.unwrap().unwrap();
    assert!(!member.initial_payment_completed);
    assert!(member.previous_payment_due_date.is_none());
    assert!(member.next_payment_due_date.is_none());
    assert!(db.fetch_payment_by_period(member.id, "initial").await.unwrap().is_none());

    // The $250 was recorded, so paying the remainder later completes the unlock.
    chain.set_usdc_balance(&member.deposit_address, MicroUsdc::from_whole(500));
    let result = monitor.run().await.expect("monitor run failed");
    assert_eq!(result.payments_completed, 1);
    let recorded = db.total_recorded_for_address(&member.deposit_address).await.unwrap();
    assert_eq!(recorded, MicroUsdc::from_whole(500));
}

#[tokio::test]
async fn repeated_runs_never_double_credit_or_double_process() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let referrer = seed_referrer(&db, "referrer@example.com", 1).await;
    let member = seed_member(&db, "member@example.com", 2, Some(referrer.id)).await;

    chain.set_usdc_balance(&member.deposit_address, MicroUsdc::from_whole(500));
    let monitor = DepositMonitorApi::new(db.clone(), chain.clone(), PricingSettings::default());

    let first = monitor.run().await.expect("monitor run failed");
    assert_eq!(first.payments_completed, 1);

    // The balance is still on chain (not yet swept); a second run must not credit it again.
    let second = monitor.run().await.expect("monitor run failed");
    assert_eq!(second.payments_completed, 0);
    assert_eq!(second.deposits_recorded, 0);

    let recorded = db.total_recorded_for_address(&member.deposit_address).await.unwrap();
    assert_eq!(recorded, MicroUsdc::from_whole(500));
    let pending = db.fetch_pending_unbatched(MicroUsdc::from_whole(1), 10).await.unwrap();
    assert_eq!(pending.len(), 1, "exactly one direct bonus commission");
}

#[tokio::test]
async fn tolerance_accepts_payments_within_one_percent() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let member = seed_member(&db, "solo@example.com", 3, None).await;

    // $496 on a $500 expectation is within the 1% tolerance.
    chain.set_usdc_balance(&member.deposit_address, MicroUsdc::from_whole(496));
    let monitor = DepositMonitorApi::new(db.clone(), chain.clone(), PricingSettings::default());
    let result = monitor.run().await.expect("monitor run failed");
    assert_eq!(result.payments_completed, 1);
    let member = db.fetch_member(member.id).await.unwrap().unwrap();
    assert!(member.initial_payment_completed);
}

#[tokio::test]
async fn dust_below_one_dollar_is_left_unrecorded() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let member = seed_member(&db, "dusty@example.com", 4, None).await;

    chain.set_usdc_balance(&member.deposit_address, MicroUsdc::from_cents(50));
    let monitor = DepositMonitorApi::new(db.clone(), chain.clone(), PricingSettings::default());
    let result = monitor.run().await.expect("monitor run failed");
    assert_eq!(result.deposits_recorded, 0);
    assert_eq!(db.total_recorded_for_address(&member.deposit_address).await.unwrap(), MicroUsdc::default());
}
