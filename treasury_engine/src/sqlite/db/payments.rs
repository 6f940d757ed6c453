use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPayment, Payment},
    traits::LedgerError,
};

/// Inserts the period's payment. `UNIQUE(member_id, period_key)` turns a duplicate into
/// [`LedgerError::PaymentAlreadyRecorded`], which callers use to roll back the surrounding
/// transition untouched.
pub async fn idempotent_insert(payment: NewPayment, conn: &mut SqliteConnection) -> Result<Payment, LedgerError> {
    let member_id = payment.member_id;
    let period_key = payment.period_key.clone();
    let row = sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments (member_id, kind, amount, period_key) VALUES ($1, $2, $3, $4)
        RETURNING *;
        "#,
    )
    .bind(payment.member_id)
    .bind(payment.kind.to_string())
    .bind(payment.amount)
    .bind(payment.period_key)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            LedgerError::PaymentAlreadyRecorded { member_id, period_key }
        },
        _ => LedgerError::from(e),
    })?;
    Ok(row)
}

pub async fn fetch_by_period(
    member_id: i64,
    period_key: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, LedgerError> {
    let payment =
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE member_id = $1 AND period_key = $2")
            .bind(member_id)
            .bind(period_key)
            .fetch_optional(conn)
            .await?;
    Ok(payment)
}
