#![allow(dead_code)]

use chrono::{Duration, Utc};
use treasury_engine::{
    db_types::{MemberAccount, NewMember, PaymentSchedule, WalletAddress},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::MemberLedger,
    SqliteLedger,
};

pub async fn new_test_ledger() -> SqliteLedger {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteLedger::new_with_url(&url, 5).await.expect("Error creating database")
}

pub fn test_address(n: u64) -> WalletAddress {
    WalletAddress::new(format!("0x{n:040x}")).expect("generated address is valid")
}

pub async fn seed_member(
    db: &SqliteLedger,
    email: &str,
    derivation_index: i64,
    referrer_id: Option<i64>,
) -> MemberAccount {
    db.insert_member(NewMember {
        email: email.to_string(),
        deposit_address: test_address(1000 + derivation_index as u64),
        derivation_index,
        payment_schedule: PaymentSchedule::Monthly,
        referrer_id,
        bypass_initial_payment: false,
    })
    .await
    .expect("Error inserting member")
}

/// A root member with a network position, a payout wallet and qualification — a valid referrer.
pub async fn seed_referrer(db: &SqliteLedger, email: &str, derivation_index: i64) -> MemberAccount {
    let member = seed_member(db, email, derivation_index, None).await;
    db.assign_network_position(member.id).await.expect("Error assigning root position");
    db.update_payout_destination(member.id, Some(test_address(2000 + derivation_index as u64)), None)
        .await
        .expect("Error setting payout wallet");
    db.set_qualified(member.id, true).await.expect("Error setting qualification");
    db.fetch_member(member.id).await.expect("Error re-fetching member").expect("member exists")
}

/// Moves a member's billing period into the past so the next subscription payment is due.
/// Existing deposit transactions are aged along with the dates, as they would be in reality,
/// so they stay inside the previous period.
pub async fn make_subscription_due(db: &SqliteLedger, member_id: i64, days_overdue: i64) {
    let previous = Utc::now() - Duration::days(days_overdue + 30);
    let next = Utc::now() - Duration::days(days_overdue);
    sqlx::query(
        "UPDATE members SET previous_payment_due_date = $1, next_payment_due_date = $2 WHERE id = $3",
    )
    .bind(previous)
    .bind(next)
    .bind(member_id)
    .execute(db.pool())
    .await
    .expect("Error rewinding due dates");
    sqlx::query("UPDATE usdc_transactions SET created_at = $1 WHERE member_id = $2")
        .bind(previous - Duration::days(1))
        .bind(member_id)
        .execute(db.pool())
        .await
        .expect("Error aging transactions");
}
