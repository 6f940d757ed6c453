use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use trs_common::MicroUsdc;

use crate::{
    db_types::{NewUsdcTransaction, UsdcTransaction, WalletAddress},
    traits::LedgerError,
};

/// Records a confirmed transfer. Inserts are idempotent on `tx_hash` for transfers that carry
/// one; a duplicate maps to [`LedgerError::DepositAlreadyRecorded`] so repeated monitor runs
/// can never double-credit the same on-chain transaction.
pub async fn insert_transaction(
    tx: NewUsdcTransaction,
    conn: &mut SqliteConnection,
) -> Result<UsdcTransaction, LedgerError> {
    let hash = tx.tx_hash.clone();
    let row = sqlx::query_as::<_, UsdcTransaction>(
        r#"
        INSERT INTO usdc_transactions (member_id, tx_type, amount, from_address, to_address, tx_hash, status,
                                       related_commission_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *;
        "#,
    )
    .bind(tx.member_id)
    .bind(tx.tx_type.to_string())
    .bind(tx.amount)
    .bind(tx.from_address)
    .bind(tx.to_address)
    .bind(tx.tx_hash)
    .bind(tx.status.to_string())
    .bind(tx.related_commission_id)
    .fetch_one(conn)
    .await
    .map_err(|e| match (e, hash) {
        (sqlx::Error::Database(err), Some(hash)) if err.is_unique_violation() => {
            LedgerError::DepositAlreadyRecorded(hash)
        },
        (e, _) => LedgerError::from(e),
    })?;
    Ok(row)
}

pub async fn sum_deposits_since(
    member_id: i64,
    cutoff: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<MicroUsdc, LedgerError> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount), 0)
        FROM usdc_transactions
        WHERE member_id = $1 AND tx_type = 'Deposit' AND status = 'Confirmed'
          AND datetime(created_at) > datetime($2)
        "#,
    )
    .bind(member_id)
    .bind(cutoff)
    .fetch_one(conn)
    .await?;
    Ok(MicroUsdc::from(total))
}

pub async fn total_recorded_for_address(
    address: &WalletAddress,
    conn: &mut SqliteConnection,
) -> Result<MicroUsdc, LedgerError> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount), 0)
        FROM usdc_transactions
        WHERE to_address = $1 AND tx_type = 'Deposit' AND status = 'Confirmed'
        "#,
    )
    .bind(address)
    .fetch_one(conn)
    .await?;
    Ok(MicroUsdc::from(total))
}

/// Attaches the payment to every unlinked deposit the member has. The sole update the
/// append-only transaction table permits.
pub async fn link_deposits_to_payment(
    member_id: i64,
    payment_id: i64,
    conn: &mut SqliteConnection,
) -> Result<u64, LedgerError> {
    let result = sqlx::query(
        r#"
        UPDATE usdc_transactions
        SET related_payment_id = $1
        WHERE member_id = $2 AND tx_type = 'Deposit' AND related_payment_id IS NULL
        "#,
    )
    .bind(payment_id)
    .bind(member_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
