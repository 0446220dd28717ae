pub mod db;
mod errors;

pub mod orders;
pub mod transfers;

use std::{env, str::FromStr, time::Duration};

pub use db::SqliteDatabase;
pub use errors::SqliteDatabaseError;
use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

const SQLITE_DB_URL: &str = "sqlite://data/recon_store.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn db_url() -> String {
    let result = env::var("RECON_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ RECON_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

/// Opens a connection pool, creating the database file if it does not exist yet.
///
/// Several processes may share one database file, so the pool waits on a locked database instead of failing
/// immediately.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqliteDatabaseError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}
