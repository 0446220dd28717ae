use std::{collections::HashSet, time::Duration};

use chrono::Utc;
use log::*;
use thiserror::Error;

use crate::{
    db::traits::{InsertEntryResult, StoreError, TransferStore},
    db_types::{EntryId, LedgerEntry, NewLedgerEntry},
    ledger::{LedgerSource, LedgerSourceError},
};

pub const DEFAULT_LOOKBACK_HOURS: i64 = 2;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Error)]
pub enum PollError {
    /// Skip this cycle and try again on the next one. Nothing has been written.
    #[error("Transient polling error. {0}")]
    Transient(String),
    /// The poll loop must stop and the operator must intervene.
    #[error("Authentication failure. {0}")]
    Authentication(String),
    #[error("Database error: {0}")]
    DatabaseError(#[from] StoreError),
}

impl PollError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, PollError::Authentication(_))
    }
}

impl From<LedgerSourceError> for PollError {
    fn from(e: LedgerSourceError) -> Self {
        match e {
            LedgerSourceError::Transient(s) => PollError::Transient(s),
            LedgerSourceError::Authentication(s) => PollError::Authentication(s),
        }
    }
}

/// The result of one poll: how many records the source returned, and the ones the store has not seen yet.
#[derive(Debug, Clone, Default)]
pub struct PolledBatch {
    pub fetched: usize,
    /// Unseen entries, ascending by occurrence time
    pub entries: Vec<NewLedgerEntry>,
}

pub struct LedgerPoller<S, B> {
    source: S,
    db: B,
    lookback: chrono::Duration,
    fetch_timeout: Duration,
}

impl<S, B> LedgerPoller<S, B>
where
    S: LedgerSource,
    B: TransferStore,
{
    pub fn new(source: S, db: B) -> Self {
        Self {
            source,
            db,
            lookback: chrono::Duration::hours(DEFAULT_LOOKBACK_HOURS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }

    pub fn with_lookback(mut self, lookback: chrono::Duration) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn lookback(&self) -> chrono::Duration {
        self.lookback
    }

    /// Fetches the lookback window from the source and returns the entries the store does not know about yet.
    ///
    /// Deduplication is done against the store by entry id, never against a cursor, so entries that the exchange
    /// reports late or out of order are still picked up. Records that cannot be parsed are logged and dropped. Nothing
    /// is written to the store.
    pub async fn poll(&self) -> Result<PolledBatch, PollError> {
        let since = Utc::now() - self.lookback;
        trace!("📡️ Fetching ledger records since {since}");
        let records = tokio::time::timeout(self.fetch_timeout, self.source.fetch_entries(since))
            .await
            .map_err(|_| {
                PollError::Transient(format!("The ledger fetch timed out after {}s", self.fetch_timeout.as_secs()))
            })??;
        let fetched = records.len();
        let observed_at = Utc::now();
        let mut seen = HashSet::with_capacity(fetched);
        let mut entries = Vec::with_capacity(fetched);
        for record in records {
            match record.into_new_entry(observed_at) {
                Ok(entry) if seen.insert(entry.entry_id.clone()) => entries.push(entry),
                Ok(entry) => trace!("📡️ Entry {} appears more than once in this batch", entry.entry_id),
                Err(e) => warn!("📡️ Ignoring ledger record. {e}"),
            }
        }
        let ids = entries.iter().map(|e| e.entry_id.clone()).collect::<Vec<EntryId>>();
        let known = self.db.filter_known_entries(&ids).await?;
        entries.retain(|e| !known.contains(&e.entry_id));
        entries.sort_by(|a, b| {
            a.occurred_at.cmp(&b.occurred_at).then_with(|| a.entry_id.as_str().cmp(b.entry_id.as_str()))
        });
        debug!("📡️ Fetched {fetched} ledger records. {} are new.", entries.len());
        Ok(PolledBatch { fetched, entries })
    }

    /// Persists new entries, preserving their order. Returns the entries that were actually inserted. An entry that
    /// another worker stored in the meantime is skipped, as is any entry that fails to save; the failure is logged and
    /// the entry will be offered again by the next poll.
    pub async fn ingest(&self, entries: Vec<NewLedgerEntry>) -> Vec<LedgerEntry> {
        let mut stored = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry_id = entry.entry_id.clone();
            match self.db.insert_entry(entry).await {
                Ok(InsertEntryResult::Inserted(entry)) => {
                    trace!("📡️ Entry {} ({} {} {}) stored", entry.entry_id, entry.kind, entry.amount, entry.currency);
                    stored.push(entry);
                },
                Ok(InsertEntryResult::AlreadyExists(_)) => {
                    debug!("📡️ Entry {entry_id} was stored by another worker");
                },
                Err(e) => error!("📡️ Could not store ledger entry {entry_id}. {e}"),
            }
        }
        stored
    }
}
