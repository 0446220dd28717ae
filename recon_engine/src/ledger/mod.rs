//! # Ledger intake
//!
//! The exchange's account ledger reaches the engine through a [`LedgerSource`]. The engine does not care how the
//! records are fetched (signed REST calls, an exported file, a test double); it only needs the raw records for a recent
//! time window.
//!
//! [`LedgerPoller`] turns those records into new ledger entries, dropping identifiers that are already stored, and
//! [`Reconciler`] runs one full poll → persist → match cycle.
mod poller;
mod reconciler;

use chrono::{DateTime, TimeZone, Utc};
use recon_common::Amount;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

pub use poller::{LedgerPoller, PollError, PolledBatch, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_LOOKBACK_HOURS};
pub use reconciler::{CycleReport, Reconciler};

use crate::db_types::{EntryId, EntryKind, NewLedgerEntry};

/// A ledger record exactly as the exchange reports it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LedgerRecord {
    pub identifier: String,
    pub amount: Amount,
    pub currency: String,
    #[serde(default)]
    pub balance: Amount,
    pub kind: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Ledger record '{identifier}' is invalid. {reason}")]
pub struct InvalidRecord {
    pub identifier: String,
    pub reason: String,
}

impl LedgerRecord {
    pub fn into_new_entry(self, observed_at: DateTime<Utc>) -> Result<NewLedgerEntry, InvalidRecord> {
        let invalid = |reason: String| InvalidRecord { identifier: self.identifier.clone(), reason };
        if self.identifier.trim().is_empty() {
            return Err(invalid("The identifier is empty".into()));
        }
        if self.currency.trim().is_empty() {
            return Err(invalid("The currency is empty".into()));
        }
        let kind = self.kind.parse::<EntryKind>().map_err(|e| invalid(e.to_string()))?;
        let entry_id = EntryId::from(self.identifier.trim());
        let entry = NewLedgerEntry::new(entry_id, self.amount, self.currency.trim(), self.occurred_at)
            .with_kind(kind)
            .with_balance(self.balance)
            .observed_at(observed_at);
        Ok(entry)
    }
}

/// Exchanges report timestamps as unix milliseconds, either as a number or a numeric string. RFC 3339 strings are
/// accepted too.
fn deserialize_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Millis(i64),
        Text(String),
    }

    let from_millis = |ms: i64| {
        Utc.timestamp_millis_opt(ms).single().ok_or_else(|| serde::de::Error::custom(format!("{ms} is out of range")))
    };
    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Millis(ms) => from_millis(ms),
        RawTimestamp::Text(s) => match s.trim().parse::<i64>() {
            Ok(ms) => from_millis(ms),
            Err(_) => DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| serde::de::Error::custom(format!("'{s}' is not a valid timestamp. {e}"))),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerSourceError {
    /// The fetch failed but may succeed on the next cycle.
    #[error("Transient ledger fetch error. {0}")]
    Transient(String),
    /// The exchange rejected the credentials. Retrying will not help.
    #[error("The exchange rejected the ledger request credentials. {0}")]
    Authentication(String),
}

/// A supplier of raw ledger records.
#[allow(async_fn_in_trait)]
pub trait LedgerSource {
    /// Fetches the ledger records that occurred at or after `since`. Records may arrive in any order and may include
    /// records that were returned before.
    async fn fetch_entries(&self, since: DateTime<Utc>) -> Result<Vec<LedgerRecord>, LedgerSourceError>;
}
