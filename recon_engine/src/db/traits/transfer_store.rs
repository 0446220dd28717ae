use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::{
    db_types::{EntryId, LedgerEntry, NewLedgerEntry},
    db::traits::{InsertEntryResult, StoreError},
};

/// Durable storage for observed ledger entries.
#[allow(async_fn_in_trait)]
pub trait TransferStore: Clone {
    /// Stores a new ledger entry. This call is idempotent: if an entry with the same `entry_id` exists, the stored
    /// record is returned untouched as [`InsertEntryResult::AlreadyExists`].
    async fn insert_entry(&self, entry: NewLedgerEntry) -> Result<InsertEntryResult, StoreError>;

    async fn fetch_entry(&self, entry_id: &EntryId) -> Result<Option<LedgerEntry>, StoreError>;

    /// Returns the subset of `entry_ids` that is already stored.
    async fn filter_known_entries(&self, entry_ids: &[EntryId]) -> Result<HashSet<EntryId>, StoreError>;

    /// Fetches unmatched entries that occurred at or after `since`, in ascending order of occurrence.
    async fn fetch_unmatched_entries(&self, since: DateTime<Utc>) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Deletes unmatched entries observed before `observed_before`. Matched entries are never deleted.
    /// Returns the number of entries removed.
    async fn prune_unmatched_entries(&self, observed_before: DateTime<Utc>) -> Result<u64, StoreError>;
}
