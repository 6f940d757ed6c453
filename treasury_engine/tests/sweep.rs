//! The three-stage sweep pipeline: funding, dispatch, verification, and the state machine's
//! behaviour under pending, confirmed and reverted receipts.

mod support;

use support::{new_test_ledger, seed_member};
use treasury_engine::{
    db_types::{AuditEventType, SweepStatus},
    test_utils::mocks::MockChain,
    traits::{AuditLedger, MemberLedger},
    SweepApi,
    SweepSettings,
};
use trs_common::MicroUsdc;

#[tokio::test]
async fn fund_stage_broadcasts_gas_with_sequential_nonces() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let a = seed_member(&db, "a@example.com", 1, None).await;
    let b = seed_member(&db, "b@example.com", 2, None).await;
    // b holds the larger balance and must be funded first.
    assert!(db.mark_needs_funding(a.id, MicroUsdc::from_whole(100)).await.unwrap());
    assert!(db.mark_needs_funding(b.id, MicroUsdc::from_whole(900)).await.unwrap());

    let sweeper = SweepApi::new(db.clone(), chain.clone(), SweepSettings::default());
    let result = sweeper.run_fund_stage().await.expect("fund run failed");
    assert_eq!(result.advanced, 2);

    let sent = chain.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].to, b.deposit_address.to_string());
    assert_eq!(sent[0].nonce, Some(0));
    assert_eq!(sent[1].to, a.deposit_address.to_string());
    assert_eq!(sent[1].nonce, Some(1));

    for id in [a.id, b.id] {
        let m = db.fetch_member(id).await.unwrap().unwrap();
        assert_eq!(m.sweep_status, SweepStatus::FundingSent);
        assert!(m.sweep_fund_tx.is_some());
    }
}

#[tokio::test]
async fn dispatch_waits_for_gas_then_broadcasts_the_sweep() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let settings = SweepSettings::default();
    let member = seed_member(&db, "a@example.com", 1, None).await;
    db.mark_needs_funding(member.id, MicroUsdc::from_whole(500)).await.unwrap();
    db.mark_funding_sent(member.id, &"0xf00d".into()).await.unwrap();
    chain.set_usdc_balance(&member.deposit_address, MicroUsdc::from_whole(500));

    let sweeper = SweepApi::new(db.clone(), chain.clone(), settings.clone());

    // No gas yet: the member stays in FundingSent.
    let result = sweeper.run_dispatch_stage().await.expect("dispatch run failed");
    assert_eq!(result.pending, 1);
    let m = db.fetch_member(member.id).await.unwrap().unwrap();
    assert_eq!(m.sweep_status, SweepStatus::FundingSent);

    // Gas arrives; the sweep goes out to the treasury address.
    chain.set_native_balance(&member.deposit_address, settings.min_gas_wei);
    let result = sweeper.run_dispatch_stage().await.expect("dispatch run failed");
    assert_eq!(result.advanced, 1);
    let m = db.fetch_member(member.id).await.unwrap().unwrap();
    assert_eq!(m.sweep_status, SweepStatus::Sweeping);
    let sent = chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].from, member.deposit_address.to_string());
    assert_eq!(sent[0].to, settings.treasury_address.to_string());
    assert_eq!(sent[0].usdc, Some(MicroUsdc::from_whole(500)));
}

#[tokio::test]
async fn verify_leaves_pending_receipts_alone() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let member = seed_member(&db, "a@example.com", 1, None).await;
    db.mark_needs_funding(member.id, MicroUsdc::from_whole(500)).await.unwrap();
    db.mark_funding_sent(member.id, &"0xf00d".into()).await.unwrap();
    db.mark_sweeping(member.id, &"0x5eep".into()).await.unwrap();

    let sweeper = SweepApi::new(db.clone(), chain.clone(), SweepSettings::default());
    let result = sweeper.run_verify_stage().await.expect("verify run failed");
    assert_eq!(result.pending, 1);
    assert_eq!(result.advanced, 0);

    let m = db.fetch_member(member.id).await.unwrap().unwrap();
    assert_eq!(m.sweep_status, SweepStatus::Sweeping);
    assert_eq!(m.sweep_verify_attempts, 1);
    // No "swept" audit entry for a pending receipt.
    assert!(db.fetch_audit_events(AuditEventType::DepositSwept, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn verified_sweep_returns_to_idle_and_is_not_reprocessed() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let member = seed_member(&db, "a@example.com", 1, None).await;
    let sweep_tx = treasury_engine::db_types::TxHash::from("0x5eep");
    db.mark_needs_funding(member.id, MicroUsdc::from_whole(500)).await.unwrap();
    db.mark_funding_sent(member.id, &"0xf00d".into()).await.unwrap();
    db.mark_sweeping(member.id, &sweep_tx).await.unwrap();
    chain.set_receipt(&sweep_tx, true);

    let sweeper = SweepApi::new(db.clone(), chain.clone(), SweepSettings::default());
    let result = sweeper.run_verify_stage().await.expect("verify run failed");
    assert_eq!(result.advanced, 1);

    let m = db.fetch_member(member.id).await.unwrap().unwrap();
    assert_eq!(m.sweep_status, SweepStatus::Idle);
    assert!(m.sweep_tx.is_none());
    assert!(m.last_swept_at.is_some());
    let audits = db.fetch_audit_events(AuditEventType::DepositSwept, 10).await.unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].amount, Some(MicroUsdc::from_whole(500)));

    // Acyclic under success: nothing left for any stage until a new balance queues the member.
    assert!(db.fetch_sweep_candidates(SweepStatus::NeedsFunding, 10).await.unwrap().is_empty());
    assert!(db.fetch_sweep_candidates(SweepStatus::FundingSent, 10).await.unwrap().is_empty());
    assert!(db.fetch_sweep_candidates(SweepStatus::Sweeping, 10).await.unwrap().is_empty());
    assert!(db.mark_needs_funding(member.id, MicroUsdc::from_whole(50)).await.unwrap());
}

#[tokio::test]
async fn reverted_sweep_is_parked_for_manual_intervention() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let member = seed_member(&db, "a@example.com", 1, None).await;
    let sweep_tx = treasury_engine::db_types::TxHash::from("0xbad");
    db.mark_needs_funding(member.id, MicroUsdc::from_whole(500)).await.unwrap();
    db.mark_funding_sent(member.id, &"0xf00d".into()).await.unwrap();
    db.mark_sweeping(member.id, &sweep_tx).await.unwrap();
    chain.set_receipt(&sweep_tx, false);

    let sweeper = SweepApi::new(db.clone(), chain.clone(), SweepSettings::default());
    let result = sweeper.run_verify_stage().await.expect("verify run failed");
    assert_eq!(result.failed, 1);

    let m = db.fetch_member(member.id).await.unwrap().unwrap();
    assert_eq!(m.sweep_status, SweepStatus::Failed);
    assert!(m.sweep_error.unwrap().contains("reverted"));
    // Failed members are invisible to every stage.
    for status in [SweepStatus::NeedsFunding, SweepStatus::FundingSent, SweepStatus::Sweeping] {
        assert!(db.fetch_sweep_candidates(status, 10).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn verify_ceiling_parks_stuck_transactions_when_configured() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let member = seed_member(&db, "a@example.com", 1, None).await;
    db.mark_needs_funding(member.id, MicroUsdc::from_whole(500)).await.unwrap();
    db.mark_funding_sent(member.id, &"0xf00d".into()).await.unwrap();
    db.mark_sweeping(member.id, &"0x5eep".into()).await.unwrap();

    let settings = SweepSettings { max_verify_attempts: 2, ..SweepSettings::default() };
    let sweeper = SweepApi::new(db.clone(), chain.clone(), settings);
    sweeper.run_verify_stage().await.expect("first verify failed");
    let result = sweeper.run_verify_stage().await.expect("second verify failed");
    assert_eq!(result.failed, 1);
    let m = db.fetch_member(member.id).await.unwrap().unwrap();
    assert_eq!(m.sweep_status, SweepStatus::Failed);
    assert!(m.sweep_error.unwrap().contains("unconfirmed"));
}
