use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;
use trs_common::MicroUsdc;

use crate::{
    db_types::{MemberAccount, NewMember, SweepStatus, TxHash, WalletAddress},
    traits::{data_objects::PositionAssignment, LedgerError},
};

pub async fn fetch_member(member_id: i64, conn: &mut SqliteConnection) -> Result<Option<MemberAccount>, LedgerError> {
    let member = sqlx::query_as::<_, MemberAccount>("SELECT * FROM members WHERE id = ?")
        .bind(member_id)
        .fetch_optional(conn)
        .await?;
    Ok(member)
}

pub async fn insert_member(member: NewMember, conn: &mut SqliteConnection) -> Result<MemberAccount, LedgerError> {
    let row = sqlx::query_as::<_, MemberAccount>(
        r#"
        INSERT INTO members (email, deposit_address, derivation_index, payment_schedule, referrer_id,
                             bypass_initial_payment)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *;
        "#,
    )
    .bind(member.email)
    .bind(member.deposit_address)
    .bind(member.derivation_index)
    .bind(member.payment_schedule.to_string())
    .bind(member.referrer_id)
    .bind(member.bypass_initial_payment)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn fetch_billable_members(
    after_id: i64,
    limit: u32,
    conn: &mut SqliteConnection,
) -> Result<Vec<MemberAccount>, LedgerError> {
    let members = sqlx::query_as::<_, MemberAccount>(
        "SELECT * FROM members WHERE id > ? AND deposit_address != '' ORDER BY id ASC LIMIT ?",
    )
    .bind(after_id)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(members)
}

pub async fn update_payout_destination(
    member_id: i64,
    wallet: Option<WalletAddress>,
    stripe_connect_id: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    sqlx::query("UPDATE members SET payout_wallet = $1, stripe_connect_id = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $3")
        .bind(wallet)
        .bind(stripe_connect_id)
        .bind(member_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_qualified(member_id: i64, qualified: bool, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    sqlx::query("UPDATE members SET qualified = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(qualified)
        .bind(member_id)
        .execute(conn)
        .await?;
    Ok(())
}

//--------------------------------------  Network placement  ---------------------------------------------------------

/// Finds the first open slot in the referrer's subtree, breadth-first, and claims it for the
/// member. Returns `None` if the member already holds a position (idempotent re-entry).
pub async fn assign_network_position(
    member_id: i64,
    width: i64,
    max_depth: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PositionAssignment>, LedgerError> {
    let member = fetch_member(member_id, &mut *conn).await?.ok_or(LedgerError::MemberNotFound(member_id))?;
    if member.position_id.is_some() {
        trace!("🌳️ Member #{member_id} already holds a network position, nothing to assign");
        return Ok(None);
    }
    let assignment = match member.referrer_id {
        Some(referrer_id) => {
            let referrer =
                fetch_member(referrer_id, &mut *conn).await?.ok_or(LedgerError::MemberNotFound(referrer_id))?;
            if referrer.position_id.is_none() {
                return Err(LedgerError::ReferrerHasNoPosition(member_id));
            }
            let parent = find_open_slot(referrer_id, width, max_depth, &mut *conn)
                .await?
                .ok_or(LedgerError::NetworkSubtreeFull(member_id))?;
            let child_count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM members WHERE parent_position_id = ?")
                    .bind(&parent.position_id)
                    .fetch_one(&mut *conn)
                    .await?;
            PositionAssignment {
                level: parent.level + 1,
                position: child_count + 1,
                position_id: format!("{}.{}", parent.position_id, child_count + 1),
                parent_position_id: Some(parent.position_id),
            }
        },
        None => {
            // Root members (no referrer) sit at level zero, numbered in arrival order.
            let root_count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM members WHERE network_level = 0")
                    .fetch_one(&mut *conn)
                    .await?;
            PositionAssignment {
                level: 0,
                position: root_count + 1,
                position_id: format!("r{}", root_count + 1),
                parent_position_id: None,
            }
        },
    };
    let updated = sqlx::query(
        r#"
        UPDATE members
        SET network_level = $1, network_position = $2, position_id = $3, parent_position_id = $4,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $5 AND position_id IS NULL
        "#,
    )
    .bind(assignment.level)
    .bind(assignment.position)
    .bind(&assignment.position_id)
    .bind(&assignment.parent_position_id)
    .bind(member_id)
    .execute(conn)
    .await?;
    // A concurrent run won the slot; treat as already-assigned.
    if updated.rows_affected() == 0 {
        return Ok(None);
    }
    Ok(Some(assignment))
}

#[derive(sqlx::FromRow)]
struct SlotRow {
    position_id: String,
    level: i64,
}

async fn find_open_slot(
    referrer_id: i64,
    width: i64,
    max_depth: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<SlotRow>, LedgerError> {
    let slot = sqlx::query_as::<_, SlotRow>(
        r#"
        WITH RECURSIVE subtree (position_id) AS (
            SELECT position_id FROM members WHERE id = $1 AND position_id IS NOT NULL
            UNION ALL
            SELECT m.position_id FROM members m JOIN subtree s ON m.parent_position_id = s.position_id
        )
        SELECT m.position_id AS position_id, m.network_level AS level
        FROM members m
        JOIN subtree s ON m.position_id = s.position_id
        WHERE m.network_level < $2
          AND (SELECT COUNT(*) FROM members c WHERE c.parent_position_id = m.position_id) < $3
        ORDER BY m.network_level ASC, m.network_position ASC, m.id ASC
        LIMIT 1
        "#,
    )
    .bind(referrer_id)
    .bind(max_depth)
    .bind(width)
    .fetch_optional(conn)
    .await?;
    Ok(slot)
}

/// Bumps the active-downline counter of every ancestor above the member. Returns the number of
/// ancestors credited.
pub async fn increment_upline_active(member_id: i64, conn: &mut SqliteConnection) -> Result<u64, LedgerError> {
    let result = sqlx::query(
        r#"
        WITH RECURSIVE upline (position_id) AS (
            SELECT parent_position_id FROM members WHERE id = $1 AND parent_position_id IS NOT NULL
            UNION ALL
            SELECT m.parent_position_id FROM members m JOIN upline u ON m.position_id = u.position_id
            WHERE m.parent_position_id IS NOT NULL
        )
        UPDATE members
        SET active_downline_count = active_downline_count + 1, updated_at = CURRENT_TIMESTAMP
        WHERE position_id IN (SELECT position_id FROM upline)
        "#,
    )
    .bind(member_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Adds subscription volume to every ancestor above the member in one statement.
pub async fn distribute_upline_volume(
    member_id: i64,
    amount: MicroUsdc,
    conn: &mut SqliteConnection,
) -> Result<u64, LedgerError> {
    let result = sqlx::query(
        r#"
        WITH RECURSIVE upline (position_id) AS (
            SELECT parent_position_id FROM members WHERE id = $1 AND parent_position_id IS NOT NULL
            UNION ALL
            SELECT m.parent_position_id FROM members m JOIN upline u ON m.position_id = u.position_id
            WHERE m.parent_position_id IS NOT NULL
        )
        UPDATE members
        SET downline_volume = downline_volume + $2, updated_at = CURRENT_TIMESTAMP
        WHERE position_id IN (SELECT position_id FROM upline)
        "#,
    )
    .bind(member_id)
    .bind(amount)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

//--------------------------------------    Sweep machine    ---------------------------------------------------------

pub async fn fetch_sweep_candidates(
    status: SweepStatus,
    limit: u32,
    conn: &mut SqliteConnection,
) -> Result<Vec<MemberAccount>, LedgerError> {
    let members = sqlx::query_as::<_, MemberAccount>(
        "SELECT * FROM members WHERE sweep_status = $1 ORDER BY sweep_balance DESC, id ASC LIMIT $2",
    )
    .bind(status.to_string())
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(members)
}

pub async fn mark_needs_funding(
    member_id: i64,
    balance: MicroUsdc,
    conn: &mut SqliteConnection,
) -> Result<bool, LedgerError> {
    let result = sqlx::query(
        r#"
        UPDATE members
        SET sweep_status = 'NeedsFunding', sweep_balance = $1, sweep_error = NULL,
            sweep_verify_attempts = 0, updated_at = CURRENT_TIMESTAMP
        WHERE id = $2 AND sweep_status = 'Idle'
        "#,
    )
    .bind(balance)
    .bind(member_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn mark_funding_sent(
    member_id: i64,
    fund_tx: &TxHash,
    conn: &mut SqliteConnection,
) -> Result<bool, LedgerError> {
    let result = sqlx::query(
        r#"
        UPDATE members
        SET sweep_status = 'FundingSent', sweep_fund_tx = $1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $2 AND sweep_status = 'NeedsFunding'
        "#,
    )
    .bind(fund_tx)
    .bind(member_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn mark_sweeping(member_id: i64, sweep_tx: &TxHash, conn: &mut SqliteConnection) -> Result<bool, LedgerError> {
    let result = sqlx::query(
        r#"
        UPDATE members
        SET sweep_status = 'Sweeping', sweep_tx = $1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $2 AND sweep_status = 'FundingSent'
        "#,
    )
    .bind(sweep_tx)
    .bind(member_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn mark_sweep_complete(member_id: i64, conn: &mut SqliteConnection) -> Result<bool, LedgerError> {
    let result = sqlx::query(
        r#"
        UPDATE members
        SET sweep_status = 'Idle', sweep_balance = 0, sweep_fund_tx = NULL, sweep_tx = NULL,
            sweep_verify_attempts = 0, last_swept_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1 AND sweep_status = 'Sweeping'
        "#,
    )
    .bind(member_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn mark_sweep_failed(member_id: i64, error: &str, conn: &mut SqliteConnection) -> Result<bool, LedgerError> {
    let result = sqlx::query(
        r#"
        UPDATE members
        SET sweep_status = 'Failed', sweep_error = $1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $2 AND sweep_status != 'Failed'
        "#,
    )
    .bind(error)
    .bind(member_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn increment_sweep_verify_attempts(member_id: i64, conn: &mut SqliteConnection) -> Result<i64, LedgerError> {
    let attempts: i64 = sqlx::query_scalar(
        r#"
        UPDATE members
        SET sweep_verify_attempts = sweep_verify_attempts + 1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
        RETURNING sweep_verify_attempts
        "#,
    )
    .bind(member_id)
    .fetch_one(conn)
    .await?;
    Ok(attempts)
}

//--------------------------------------     Due dates       ---------------------------------------------------------

pub async fn set_unlocked_and_active(
    member_id: i64,
    previous_due: DateTime<Utc>,
    next_due: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
        UPDATE members
        SET initial_payment_completed = 1, is_active = 1, previous_payment_due_date = $1,
            next_payment_due_date = $2, updated_at = CURRENT_TIMESTAMP
        WHERE id = $3
        "#,
    )
    .bind(previous_due)
    .bind(next_due)
    .bind(member_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Rolls the billing period forward: the old next due date becomes the new previous one.
/// Periods chain off each other, never off "now", so late payments cannot drift the anchor.
/// `fallback_previous` seeds the chain for members that never had due dates (bypass members on
/// their first subscription payment).
pub async fn roll_due_dates(
    member_id: i64,
    fallback_previous: DateTime<Utc>,
    next_due: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
        UPDATE members
        SET previous_payment_due_date = COALESCE(next_payment_due_date, $1), next_payment_due_date = $2,
            is_active = 1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $3
        "#,
    )
    .bind(fallback_previous)
    .bind(next_due)
    .bind(member_id)
    .execute(conn)
    .await?;
    Ok(())
}
