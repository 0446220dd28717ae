use chrono::{DateTime, Utc};
use recon_common::Amount;

use crate::db_types::{LedgerEntry, PaymentOrder};

#[derive(Debug, Clone)]
pub enum InsertEntryResult {
    Inserted(LedgerEntry),
    AlreadyExists(LedgerEntry),
}

impl InsertEntryResult {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            InsertEntryResult::Inserted(e) | InsertEntryResult::AlreadyExists(e) => e,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, InsertEntryResult::Inserted(_))
    }
}

/// The outcome of an attempt to link a ledger entry to an order.
#[derive(Debug, Clone)]
pub enum MatchCommit {
    /// Both sides were updated. The records reflect the state after the commit.
    Committed { order: PaymentOrder, entry: LedgerEntry },
    /// The order was no longer pending. Nothing was changed.
    OrderClaimed,
    /// The entry had already been matched. Nothing was changed.
    EntryClaimed,
}

/// Selection criteria for orders that a ledger entry could pay for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateQuery {
    pub currency: String,
    pub min_amount: Amount,
    pub max_amount: Amount,
    /// Orders must have been created at or before this instant, and expire after it.
    pub occurred_at: DateTime<Utc>,
}

impl CandidateQuery {
    pub fn for_entry(entry: &LedgerEntry, tolerance: Amount) -> Self {
        let tolerance = tolerance.saturating_abs();
        let min_amount = entry.amount.checked_sub(tolerance).unwrap_or(Amount::from(i64::MIN));
        let max_amount = entry.amount.checked_add(tolerance).unwrap_or(Amount::from(i64::MAX));
        Self { currency: entry.currency.clone(), min_amount, max_amount, occurred_at: entry.occurred_at }
    }
}
