//! # SQLite database methods
//!
//! "Low-level" SQLite interactions live here as simple functions (rather than stateful structs)
//! that accept a `&mut SqliteConnection`. Callers can obtain a connection from a pool, or create
//! an atomic transaction as the need arises and call through without any other changes.
//!
//! Datetime predicates wrap both sides in `datetime(...)` so that values written by SQLite
//! defaults and values bound from chrono compare correctly regardless of their text format.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod audit;
pub mod batches;
pub mod commissions;
pub mod intents;
pub mod members;
pub mod outbox;
pub mod payments;
pub mod transactions;

const SQLITE_DB_URL: &str = "sqlite://data/treasury_store.db";

pub fn db_url() -> String {
    let result = env::var("TRS_DATABASE_URL").unwrap_or_else(|_| {
        info!("TRS_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
