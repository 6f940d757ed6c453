use sqlx::SqliteConnection;

use crate::{
    db_types::{AuditEvent, AuditEventType, NewAuditEvent},
    traits::LedgerError,
};

pub async fn append(event: NewAuditEvent, conn: &mut SqliteConnection) -> Result<i64, LedgerError> {
    let detail = event.detail.to_string();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO audit_log (event_type, member_id, amount, detail)
        VALUES ($1, $2, $3, $4)
        RETURNING id;
        "#,
    )
    .bind(event.event_type.to_string())
    .bind(event.member_id)
    .bind(event.amount)
    .bind(detail)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn fetch_events(
    event_type: AuditEventType,
    limit: u32,
    conn: &mut SqliteConnection,
) -> Result<Vec<AuditEvent>, LedgerError> {
    let events = sqlx::query_as::<_, AuditEvent>(
        "SELECT * FROM audit_log WHERE event_type = $1 ORDER BY id DESC LIMIT $2",
    )
    .bind(event_type.to_string())
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(events)
}
