use sqlx::SqliteConnection;
use trs_common::MicroUsdc;

use crate::{
    db_types::{Commission, NewCommission},
    traits::{data_objects::MarkPaidOutcome, LedgerError},
};

pub async fn insert_commission(
    commission: NewCommission,
    conn: &mut SqliteConnection,
) -> Result<Commission, LedgerError> {
    let row = sqlx::query_as::<_, Commission>(
        r#"
        INSERT INTO commissions (referrer_id, source_member_id, commission_type, amount)
        VALUES ($1, $2, $3, $4)
        RETURNING *;
        "#,
    )
    .bind(commission.referrer_id)
    .bind(commission.source_member_id)
    .bind(commission.commission_type.to_string())
    .bind(commission.amount)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn fetch_commission(
    commission_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Commission>, LedgerError> {
    let commission = sqlx::query_as::<_, Commission>("SELECT * FROM commissions WHERE id = ?")
        .bind(commission_id)
        .fetch_optional(conn)
        .await?;
    Ok(commission)
}

pub async fn fetch_pending_unbatched(
    min_amount: MicroUsdc,
    limit: u32,
    conn: &mut SqliteConnection,
) -> Result<Vec<Commission>, LedgerError> {
    let commissions = sqlx::query_as::<_, Commission>(
        r#"
        SELECT * FROM commissions
        WHERE status = 'Pending' AND payout_batch_id IS NULL AND amount >= $1
        ORDER BY created_at ASC, id ASC
        LIMIT $2
        "#,
    )
    .bind(min_amount)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(commissions)
}

pub async fn fetch_pending_batched(limit: u32, conn: &mut SqliteConnection) -> Result<Vec<Commission>, LedgerError> {
    let commissions = sqlx::query_as::<_, Commission>(
        r#"
        SELECT * FROM commissions
        WHERE status = 'Pending' AND payout_batch_id IS NOT NULL
        ORDER BY created_at ASC, id ASC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(commissions)
}

/// The one-way paid transition. The `status = 'Pending'` guard makes a second attempt a no-op.
pub async fn mark_paid(
    commission_id: i64,
    method: &str,
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<MarkPaidOutcome, LedgerError> {
    let result = sqlx::query(
        r#"
        UPDATE commissions
        SET status = 'Paid', payout_method = $1, payout_reference = $2, error_message = NULL,
            paid_at = CURRENT_TIMESTAMP
        WHERE id = $3 AND status = 'Pending'
        "#,
    )
    .bind(method)
    .bind(reference)
    .bind(commission_id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 1 {
        Ok(MarkPaidOutcome::Paid)
    } else {
        Ok(MarkPaidOutcome::AlreadyPaid)
    }
}

pub async fn record_failure(commission_id: i64, error: &str, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
        UPDATE commissions
        SET error_message = $1, retry_count = retry_count + 1
        WHERE id = $2
        "#,
    )
    .bind(error)
    .bind(commission_id)
    .execute(conn)
    .await?;
    Ok(())
}
