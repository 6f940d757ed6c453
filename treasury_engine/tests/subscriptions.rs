//! Subscription renewals: period chaining, the atomic due-date/payment transition, and its
//! idempotency under duplicate invocation.

mod support;

use chrono::Utc;
use support::{make_subscription_due, new_test_ledger, seed_member, seed_referrer};
use treasury_engine::{
    db_types::{CommissionType, PaymentKind},
    helpers::next_due_date,
    test_utils::mocks::MockChain,
    traits::{CommissionLedger, LedgerError, MemberLedger, PaymentLedger},
    DepositMonitorApi,
    PricingSettings,
};
use trs_common::MicroUsdc;

#[tokio::test]
async fn overdue_subscription_is_settled_and_periods_chain() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let referrer = seed_referrer(&db, "referrer@example.com", 1).await;
    let member = seed_member(&db, "member@example.com", 2, Some(referrer.id)).await;
    let monitor = DepositMonitorApi::new(db.clone(), chain.clone(), PricingSettings::default());

    // Unlock first, then age the membership so a monthly payment is 3 days overdue.
    chain.set_usdc_balance(&member.deposit_address, MicroUsdc::from_whole(500));
    monitor.run().await.expect("unlock run failed");
    make_subscription_due(&db, member.id, 3).await;
    let before = db.fetch_member(member.id).await.unwrap().unwrap();
    let old_next = before.next_payment_due_date.unwrap();

    // $199 arrives on chain on top of the recorded $500.
    chain.set_usdc_balance(&member.deposit_address, MicroUsdc::from_whole(699));
    let result = monitor.run().await.expect("renewal run failed");
    assert_eq!(result.payments_completed, 1);
    assert_eq!(result.deposits_recorded, 1);

    let after = db.fetch_member(member.id).await.unwrap().unwrap();
    // The old next due date became the new previous one; the new next is one period beyond it.
    assert_eq!(after.previous_payment_due_date.unwrap(), old_next);
    assert_eq!(after.next_payment_due_date.unwrap(), next_due_date(old_next, after.payment_schedule));

    let key = treasury_engine::helpers::period_key(after.payment_schedule, old_next);
    let payment = db.fetch_payment_by_period(member.id, &key).await.unwrap().unwrap();
    assert_eq!(payment.kind, PaymentKind::Monthly);
    assert_eq!(payment.amount, MicroUsdc::from_whole(199));

    // The referrer earned a 10% residual.
    let pending = db.fetch_pending_unbatched(MicroUsdc::from_cents(1), 10).await.unwrap();
    let residual = pending.iter().find(|c| c.commission_type == CommissionType::Residual).unwrap();
    assert_eq!(residual.referrer_id, referrer.id);
    assert_eq!(residual.amount, MicroUsdc::from_cents(1_990));

    // Upline volume reached the referrer.
    let referrer = db.fetch_member(referrer.id).await.unwrap().unwrap();
    assert_eq!(referrer.downline_volume, MicroUsdc::from_whole(199));
}

#[tokio::test]
async fn duplicate_period_settlement_advances_dates_exactly_once() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let member = seed_member(&db, "member@example.com", 2, None).await;
    let monitor = DepositMonitorApi::new(db.clone(), chain.clone(), PricingSettings::default());

    chain.set_usdc_balance(&member.deposit_address, MicroUsdc::from_whole(500));
    monitor.run().await.expect("unlock run failed");
    make_subscription_due(&db, member.id, 1).await;
    let before = db.fetch_member(member.id).await.unwrap().unwrap();
    let due = before.next_payment_due_date.unwrap();
    let key = treasury_engine::helpers::period_key(before.payment_schedule, due);
    let next = next_due_date(due, before.payment_schedule);

    let first = db
        .complete_subscription_period(member.id, MicroUsdc::from_whole(199), &key, due, next, None, "test")
        .await;
    assert!(first.is_ok());
    let after_first = db.fetch_member(member.id).await.unwrap().unwrap();

    // The duplicate rolls back in full: same error, identical due dates, one payment row.
    let second = db
        .complete_subscription_period(member.id, MicroUsdc::from_whole(199), &key, due, next, None, "test")
        .await;
    match second {
        Err(LedgerError::PaymentAlreadyRecorded { member_id, period_key }) => {
            assert_eq!(member_id, member.id);
            assert_eq!(period_key, key);
        },
        other => panic!("expected PaymentAlreadyRecorded, got {other:?}"),
    }
    let after_second = db.fetch_member(member.id).await.unwrap().unwrap();
    assert_eq!(after_first.previous_payment_due_date, after_second.previous_payment_due_date);
    assert_eq!(after_first.next_payment_due_date, after_second.next_payment_due_date);
    assert!(db.fetch_payment_by_period(member.id, &key).await.unwrap().is_some());
}

#[tokio::test]
async fn settled_period_reports_up_to_date_until_next_due() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let member = seed_member(&db, "member@example.com", 2, None).await;
    let monitor = DepositMonitorApi::new(db.clone(), chain.clone(), PricingSettings::default());

    chain.set_usdc_balance(&member.deposit_address, MicroUsdc::from_whole(500));
    monitor.run().await.expect("unlock run failed");

    // Freshly unlocked: the next due date is a month out, so repeated runs are no-ops.
    let result = monitor.run().await.expect("second run failed");
    assert_eq!(result.up_to_date, 1);
    assert_eq!(result.payments_completed, 0);

    let member = db.fetch_member(member.id).await.unwrap().unwrap();
    assert!(member.next_payment_due_date.unwrap() > Utc::now());
}
