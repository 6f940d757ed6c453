use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use trs_common::MicroUsdc;

use crate::{
    db_types::{IntentStatus, PaymentIntent, PaymentKind},
    traits::LedgerError,
};

pub async fn fetch_or_create(
    member_id: i64,
    kind: PaymentKind,
    amount: MicroUsdc,
    period_key: &str,
    expires_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PaymentIntent, LedgerError> {
    sqlx::query(
        r#"
        INSERT INTO payment_intents (member_id, kind, amount, period_key, expires_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (member_id, period_key) DO NOTHING
        "#,
    )
    .bind(member_id)
    .bind(kind.to_string())
    .bind(amount)
    .bind(period_key)
    .bind(expires_at)
    .execute(&mut *conn)
    .await?;
    let intent = sqlx::query_as::<_, PaymentIntent>(
        "SELECT * FROM payment_intents WHERE member_id = $1 AND period_key = $2",
    )
    .bind(member_id)
    .bind(period_key)
    .fetch_one(conn)
    .await?;
    Ok(intent)
}

/// Compare-and-swap on intent status. Zero rows affected means the intent was not in any of the
/// `from` states — another run holds the transition.
pub async fn update_if_status_in(
    intent_id: i64,
    from: &[IntentStatus],
    to: IntentStatus,
    conn: &mut SqliteConnection,
) -> Result<bool, LedgerError> {
    let placeholders = from.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let sql = format!(
        "UPDATE payment_intents SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ? AND status IN ({placeholders})"
    );
    let mut query = sqlx::query(&sql).bind(to.to_string()).bind(intent_id);
    for status in from {
        query = query.bind(status.to_string());
    }
    let result = query.execute(conn).await?;
    Ok(result.rows_affected() == 1)
}

pub async fn expire_stale(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<u64, LedgerError> {
    let result = sqlx::query(
        r#"
        UPDATE payment_intents
        SET status = 'Expired', updated_at = CURRENT_TIMESTAMP
        WHERE status IN ('Created', 'AwaitingFunds') AND datetime(expires_at) < datetime($1)
        "#,
    )
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
