use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPayoutBatch, PayoutBatch},
    traits::LedgerError,
};

pub async fn insert_batch(batch: NewPayoutBatch, conn: &mut SqliteConnection) -> Result<PayoutBatch, LedgerError> {
    let row = sqlx::query_as::<_, PayoutBatch>(
        r#"
        INSERT INTO payout_batches (name, batch_type, total_amount, payout_count, gas_estimate_wei)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *;
        "#,
    )
    .bind(batch.name)
    .bind(batch.batch_type.to_string())
    .bind(batch.total_amount)
    .bind(batch.payout_count)
    .bind(batch.gas_estimate_wei)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

/// Stamps the batch id onto the given commissions. The `payout_batch_id IS NULL` filter keeps
/// assignment a partition: a commission claimed by a concurrent batch run is left alone.
pub async fn assign_commissions(
    batch_id: i64,
    commission_ids: &[i64],
    conn: &mut SqliteConnection,
) -> Result<u64, LedgerError> {
    if commission_ids.is_empty() {
        return Ok(0);
    }
    let placeholders = commission_ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let sql = format!(
        "UPDATE commissions SET payout_batch_id = ? \
         WHERE id IN ({placeholders}) AND payout_batch_id IS NULL AND status = 'Pending'"
    );
    let mut query = sqlx::query(&sql).bind(batch_id);
    for id in commission_ids {
        query = query.bind(id);
    }
    let result = query.execute(conn).await?;
    Ok(result.rows_affected())
}
