//! Gas/treasury monitoring: threshold classification and the always-on balance snapshot.

mod support;

use support::new_test_ledger;
use treasury_engine::{
    db_types::AuditEventType,
    test_utils::mocks::MockChain,
    traits::{AuditLedger, ChainClient, TreasuryWallet},
    BalanceLevel,
    TreasuryMonitorApi,
    TreasurySettings,
};
use trs_common::MicroUsdc;

#[tokio::test]
async fn healthy_balances_snapshot_without_alerts() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let settings = TreasurySettings::default();
    chain.set_native_balance(chain.wallet_address(TreasuryWallet::Gas), settings.gas_warning_wei * 2);
    chain.set_usdc_balance(chain.wallet_address(TreasuryWallet::Payout), MicroUsdc::from_whole(50_000));

    let monitor = TreasuryMonitorApi::new(db.clone(), chain.clone(), settings);
    let report = monitor.run().await.expect("monitor run failed");
    assert_eq!(report.gas_level, BalanceLevel::Ok);
    assert_eq!(report.payout_level, BalanceLevel::Ok);
    assert_eq!(report.alerts_sent, 0);

    // The snapshot lands even when everything is healthy.
    let snapshots = db.fetch_audit_events(AuditEventType::BalanceSnapshot, 10).await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert!(db.fetch_pending_outbox(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn low_balances_raise_alerts_every_run() {
    let db = new_test_ledger().await;
    let chain = MockChain::default();
    let settings = TreasurySettings::default();
    chain.set_native_balance(chain.wallet_address(TreasuryWallet::Gas), settings.gas_critical_wei / 2);
    chain.set_usdc_balance(chain.wallet_address(TreasuryWallet::Payout), MicroUsdc::from_whole(2_000));

    let monitor = TreasuryMonitorApi::new(db.clone(), chain.clone(), settings);
    let report = monitor.run().await.expect("monitor run failed");
    assert_eq!(report.gas_level, BalanceLevel::Critical);
    assert_eq!(report.payout_level, BalanceLevel::Warning);
    assert_eq!(report.alerts_sent, 2);

    // No internal dedup: a second run alerts again, and the time series keeps growing.
    monitor.run().await.expect("second run failed");
    let snapshots = db.fetch_audit_events(AuditEventType::BalanceSnapshot, 10).await.unwrap();
    assert_eq!(snapshots.len(), 2);
    let alerts = db.fetch_pending_outbox(10).await.unwrap();
    assert_eq!(alerts.len(), 4);
    assert!(alerts.iter().all(|m| m.kind == "balance_alert"));
}
