use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db::{sqlite::SqliteDatabaseError, traits::InsertEntryResult},
    db_types::{EntryId, LedgerEntry, MatchState, NewLedgerEntry, OrderId},
};

/// Inserts the entry unless one with the same `entry_id` already exists, in which case the stored entry is returned.
pub async fn idempotent_insert(
    entry: NewLedgerEntry,
    conn: &mut SqliteConnection,
) -> Result<InsertEntryResult, SqliteDatabaseError> {
    let entry_id = entry.entry_id.clone();
    let result = sqlx::query_as::<_, LedgerEntry>(
        r#"
            INSERT INTO ledger_entries (entry_id, amount, currency, balance, kind, occurred_at, observed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *;
        "#,
    )
    .bind(&entry.entry_id)
    .bind(entry.amount)
    .bind(&entry.currency)
    .bind(entry.balance)
    .bind(entry.kind)
    .bind(entry.occurred_at)
    .bind(entry.observed_at)
    .fetch_one(&mut *conn)
    .await;
    match result {
        Ok(entry) => {
            trace!("🗃️ Ledger entry {} stored with id {}", entry.entry_id, entry.id);
            Ok(InsertEntryResult::Inserted(entry))
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            debug!("🗃️ Ledger entry {entry_id} has been seen before");
            let existing =
                fetch_entry(&entry_id, conn).await?.ok_or_else(|| SqliteDatabaseError::EntryNotFound(entry_id))?;
            Ok(InsertEntryResult::AlreadyExists(existing))
        },
        Err(e) => Err(SqliteDatabaseError::from(e)),
    }
}

pub async fn fetch_entry(
    entry_id: &EntryId,
    conn: &mut SqliteConnection,
) -> Result<Option<LedgerEntry>, SqliteDatabaseError> {
    let entry = sqlx::query_as("SELECT * FROM ledger_entries WHERE entry_id = ?")
        .bind(entry_id)
        .fetch_optional(conn)
        .await?;
    Ok(entry)
}

pub async fn filter_known_entries(
    entry_ids: &[EntryId],
    conn: &mut SqliteConnection,
) -> Result<HashSet<EntryId>, SqliteDatabaseError> {
    if entry_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let mut builder = QueryBuilder::new("SELECT entry_id FROM ledger_entries WHERE entry_id IN (");
    let mut separated = builder.separated(", ");
    for id in entry_ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");
    let known: Vec<(EntryId,)> = builder.build_query_as().fetch_all(conn).await?;
    Ok(known.into_iter().map(|(id,)| id).collect())
}

pub async fn fetch_unmatched_entries(
    since: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, SqliteDatabaseError> {
    let entries = sqlx::query_as(
        r#"
            SELECT * FROM ledger_entries
            WHERE match_state = ? AND occurred_at >= ?
            ORDER BY occurred_at ASC, id ASC;
        "#,
    )
    .bind(MatchState::Unmatched)
    .bind(since)
    .fetch_all(conn)
    .await?;
    Ok(entries)
}

/// Marks the entry as matched, but only if it is currently unmatched. Returns `true` if the entry was updated.
///
/// This is not atomic by itself. Call it inside a transaction together with the order update.
pub async fn claim_entry(
    entry_id: &EntryId,
    order_id: &OrderId,
    matched_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            UPDATE ledger_entries SET match_state = ?, matched_order_id = ?, matched_at = ?
            WHERE entry_id = ? AND match_state = ?;
        "#,
    )
    .bind(MatchState::Matched)
    .bind(order_id)
    .bind(matched_at)
    .bind(entry_id)
    .bind(MatchState::Unmatched)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn prune_unmatched_entries(
    observed_before: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u64, SqliteDatabaseError> {
    let result = sqlx::query("DELETE FROM ledger_entries WHERE match_state = ? AND observed_at < ?")
        .bind(MatchState::Unmatched)
        .bind(observed_before)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
