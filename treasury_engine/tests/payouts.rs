//! Payout batching and execution: the partition property, the at-most-once payout invariant,
//! the fiat fee, and the recorded-failure paths.

mod support;

use support::{new_test_ledger, seed_member, seed_referrer, test_address};
use treasury_engine::{
    db_types::{Actor, AuditEventType, CommissionStatus, CommissionType, NewCommission},
    test_utils::mocks::{MockChain, MockRail},
    traits::{AuditLedger, ChainClient, CommissionLedger, MemberLedger, TreasuryWallet},
    PayoutBatcherApi,
    PayoutError,
    PayoutExecutorApi,
    PayoutOutcome,
    PayoutSettings,
};
use trs_common::MicroUsdc;

async fn seed_commission(
    db: &treasury_engine::SqliteLedger,
    referrer_id: i64,
    source_member_id: i64,
    amount: MicroUsdc,
) -> i64 {
    db.create_commission(NewCommission {
        referrer_id,
        source_member_id,
        commission_type: CommissionType::DirectBonus,
        amount,
    })
    .await
    .expect("Error creating commission")
    .id
}

#[tokio::test]
async fn batcher_partitions_eligible_commissions_only() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    // Two referrers: one fully set up, one with no payout destination at all.
    let funded = seed_referrer(&db, "funded@example.com", 1).await;
    let unfunded = seed_member(&db, "unfunded@example.com", 2, None).await;
    let source = seed_member(&db, "source@example.com", 3, Some(funded.id)).await;

    let c1 = seed_commission(&db, funded.id, source.id, MicroUsdc::from_whole(50)).await;
    let c2 = seed_commission(&db, funded.id, source.id, MicroUsdc::from_whole(30)).await;
    let c3 = seed_commission(&db, unfunded.id, source.id, MicroUsdc::from_whole(40)).await;

    let batcher = PayoutBatcherApi::new(db.clone(), chain.clone(), PayoutSettings::default());
    let result = batcher.run().await.expect("batch run failed");

    let batch = result.direct_bonus_batch.expect("a direct bonus batch");
    assert_eq!(batch.payout_count, 1, "one referrer in the batch");
    assert_eq!(batch.total_amount, MicroUsdc::from_whole(80));
    assert_eq!(result.skipped_no_destination, 1);

    // The funded referrer's commissions joined the batch; the wallet-less one stayed put.
    for id in [c1, c2] {
        let c = db.fetch_commission(id).await.unwrap().unwrap();
        assert_eq!(c.payout_batch_id, Some(batch.batch_id));
    }
    let c = db.fetch_commission(c3).await.unwrap().unwrap();
    assert_eq!(c.payout_batch_id, None);

    // Re-running creates nothing new: assignment is a partition, not a multiset.
    let rerun = batcher.run().await.expect("second batch run failed");
    assert!(rerun.direct_bonus_batch.is_none());
}

#[tokio::test]
async fn batcher_never_creates_an_empty_batch() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let unfunded = seed_member(&db, "unfunded@example.com", 2, None).await;
    let source = seed_member(&db, "source@example.com", 3, None).await;
    seed_commission(&db, unfunded.id, source.id, MicroUsdc::from_whole(40)).await;

    let batcher = PayoutBatcherApi::new(db.clone(), chain.clone(), PayoutSettings::default());
    let result = batcher.run().await.expect("batch run failed");
    assert!(result.direct_bonus_batch.is_none());
    assert!(result.residual_batch.is_none());
}

#[tokio::test]
async fn crypto_payout_executes_exactly_once() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let rail = MockRail::default();
    let referrer = seed_referrer(&db, "referrer@example.com", 1).await;
    let source = seed_member(&db, "source@example.com", 2, Some(referrer.id)).await;
    let commission_id = seed_commission(&db, referrer.id, source.id, MicroUsdc::from_whole(100)).await;

    let payout_wallet = chain.wallet_address(TreasuryWallet::Payout).clone();
    chain.set_usdc_balance(&payout_wallet, MicroUsdc::from_whole(10_000));

    let executor = PayoutExecutorApi::new(db.clone(), chain.clone(), rail.clone(), PayoutSettings::default());
    let outcome = executor.execute(commission_id, Actor::Cron).await.expect("payout failed");
    match outcome {
        PayoutOutcome::Executed { method, net_amount, .. } => {
            assert_eq!(method, "usdc");
            // Crypto payouts carry no processing fee.
            assert_eq!(net_amount, MicroUsdc::from_whole(100));
        },
        other => panic!("expected Executed, got {other:?}"),
    }
    let commission = db.fetch_commission(commission_id).await.unwrap().unwrap();
    assert_eq!(commission.status, CommissionStatus::Paid);
    assert!(commission.paid_at.is_some());
    assert_eq!(chain.sent().len(), 1);

    // Second submission: skipped, no transfer, no new audit entry.
    let outcome = executor.execute(commission_id, Actor::Cron).await.expect("second call failed");
    assert!(matches!(outcome, PayoutOutcome::Skipped));
    assert_eq!(chain.sent().len(), 1);
    let audits = db.fetch_audit_events(AuditEventType::PayoutExecuted, 10).await.unwrap();
    assert_eq!(audits.len(), 1);
}

#[tokio::test]
async fn fiat_payout_deducts_processing_fee() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let rail = MockRail::default();
    let referrer = seed_member(&db, "referrer@example.com", 1, None).await;
    db.update_payout_destination(referrer.id, None, Some("acct_123".to_string())).await.unwrap();
    db.set_qualified(referrer.id, true).await.unwrap();
    let source = seed_member(&db, "source@example.com", 2, Some(referrer.id)).await;
    let commission_id = seed_commission(&db, referrer.id, source.id, MicroUsdc::from_whole(100)).await;

    let executor = PayoutExecutorApi::new(db.clone(), chain.clone(), rail.clone(), PayoutSettings::default());
    let outcome = executor.execute(commission_id, Actor::Admin(7)).await.expect("payout failed");
    match outcome {
        PayoutOutcome::Executed { method, net_amount, .. } => {
            assert_eq!(method, "stripe");
            // $100 gross minus the fixed 3.5% processing fee.
            assert_eq!(net_amount, MicroUsdc::from_cents(9_650));
        },
        other => panic!("expected Executed, got {other:?}"),
    }
    let transfers = rail.transfers();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].amount, MicroUsdc::from_cents(9_650));
    assert_eq!(transfers[0].destination_account, "acct_123");
    // No on-chain movement for a fiat payout.
    assert!(chain.sent().is_empty());
}

#[tokio::test]
async fn unqualified_referrer_is_a_recorded_failure() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let rail = MockRail::default();
    let referrer = seed_member(&db, "referrer@example.com", 1, None).await;
    db.update_payout_destination(referrer.id, Some(test_address(99)), None).await.unwrap();
    let source = seed_member(&db, "source@example.com", 2, Some(referrer.id)).await;
    let commission_id = seed_commission(&db, referrer.id, source.id, MicroUsdc::from_whole(100)).await;

    let executor = PayoutExecutorApi::new(db.clone(), chain.clone(), rail.clone(), PayoutSettings::default());
    let outcome = executor.execute(commission_id, Actor::Cron).await.expect("execute failed");
    assert!(matches!(outcome, PayoutOutcome::Failed { .. }));

    let commission = db.fetch_commission(commission_id).await.unwrap().unwrap();
    assert_eq!(commission.status, CommissionStatus::Pending);
    assert_eq!(commission.retry_count, 1);
    assert!(commission.error_message.unwrap().contains("qualification"));
    // The member got told.
    let outbox = db.fetch_pending_outbox(10).await.unwrap();
    assert!(outbox.iter().any(|m| m.kind == "payout_failed" && m.member_id == referrer.id));
}

#[tokio::test]
async fn underfunded_payout_wallet_aborts_without_touching_the_commission() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let rail = MockRail::default();
    let referrer = seed_referrer(&db, "referrer@example.com", 1).await;
    let source = seed_member(&db, "source@example.com", 2, Some(referrer.id)).await;
    let commission_id = seed_commission(&db, referrer.id, source.id, MicroUsdc::from_whole(100)).await;
    // Payout wallet balance stays zero.

    let executor = PayoutExecutorApi::new(db.clone(), chain.clone(), rail.clone(), PayoutSettings::default());
    let result = executor.execute(commission_id, Actor::Cron).await;
    assert!(matches!(result, Err(PayoutError::TreasuryUnderfunded)));

    let commission = db.fetch_commission(commission_id).await.unwrap().unwrap();
    assert_eq!(commission.status, CommissionStatus::Pending);
    assert_eq!(commission.retry_count, 0);
    assert!(commission.error_message.is_none());
    assert!(chain.sent().is_empty());
}

#[tokio::test]
async fn disabled_stripe_payouts_are_a_recorded_failure() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let rail = MockRail::default();
    let referrer = seed_member(&db, "referrer@example.com", 1, None).await;
    db.update_payout_destination(referrer.id, None, Some("acct_off".to_string())).await.unwrap();
    db.set_qualified(referrer.id, true).await.unwrap();
    rail.set_payouts_enabled("acct_off", false);
    let source = seed_member(&db, "source@example.com", 2, Some(referrer.id)).await;
    let commission_id = seed_commission(&db, referrer.id, source.id, MicroUsdc::from_whole(100)).await;

    let executor = PayoutExecutorApi::new(db.clone(), chain.clone(), rail.clone(), PayoutSettings::default());
    let outcome = executor.execute(commission_id, Actor::Cron).await.expect("execute failed");
    assert!(matches!(outcome, PayoutOutcome::Failed { .. }));
    let commission = db.fetch_commission(commission_id).await.unwrap().unwrap();
    assert_eq!(commission.status, CommissionStatus::Pending);
    assert!(commission.error_message.unwrap().contains("payouts disabled"));
    assert!(rail.transfers().is_empty());
}
