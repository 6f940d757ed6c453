use sqlx::SqliteConnection;

use crate::{
    db_types::OutboxMessage,
    traits::{LedgerError, Notification},
};

/// Queues a notification row. Called from inside composite ledger transactions so the outbox
/// row commits or rolls back together with the state change it announces.
pub async fn enqueue(
    member_id: i64,
    notification: &Notification,
    correlation_id: &str,
    conn: &mut SqliteConnection,
) -> Result<i64, LedgerError> {
    let payload = serde_json::to_string(notification).map_err(|e| LedgerError::DatabaseError(e.to_string()))?;
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO outbox (member_id, kind, payload, correlation_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id;
        "#,
    )
    .bind(member_id)
    .bind(notification.kind())
    .bind(payload)
    .bind(correlation_id)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn fetch_pending(limit: u32, conn: &mut SqliteConnection) -> Result<Vec<OutboxMessage>, LedgerError> {
    let messages = sqlx::query_as::<_, OutboxMessage>(
        "SELECT * FROM outbox WHERE status = 'Pending' ORDER BY id ASC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(messages)
}

pub async fn mark_sent(outbox_id: i64, conn: &mut SqliteConnection) -> Result<bool, LedgerError> {
    let result = sqlx::query(
        "UPDATE outbox SET status = 'Sent', sent_at = CURRENT_TIMESTAMP WHERE id = $1 AND status = 'Pending'",
    )
    .bind(outbox_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
