use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use recon_common::Amount;

use crate::{
    db::traits::{CandidateQuery, MatchCommit, ReconciliationDatabase, StoreError},
    db_types::{LedgerEntry, MatchState, OrderId},
    events::{EventProducers, OrderMatchedEvent},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    /// The entry pays for this order. This is also reported when another matcher committed the entry first.
    Matched(OrderId),
    Unmatched,
}

impl MatchResult {
    pub fn is_matched(&self) -> bool {
        matches!(self, MatchResult::Matched(_))
    }
}

/// Links incoming ledger entries to the pending orders they pay for.
///
/// Several matchers may run against the same database at once. The only coordination between them is the
/// compare-and-set in [`ReconciliationDatabase::commit_match`]: a matcher that loses the race on an order moves on
/// to the next candidate, and one that loses the race on the entry reports the match the winner made.
pub struct Matcher<B> {
    db: B,
    tolerance: Amount,
    producers: EventProducers,
}

impl<B> Debug for Matcher<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Matcher (tolerance: {})", self.tolerance)
    }
}

impl<B> Matcher<B> {
    /// Creates a matcher that requires exact amount equality.
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, tolerance: Amount::default(), producers }
    }

    pub fn with_tolerance(mut self, tolerance: Amount) -> Self {
        self.tolerance = tolerance.saturating_abs();
        self
    }

    pub fn tolerance(&self) -> Amount {
        self.tolerance
    }
}

impl<B> Matcher<B>
where B: ReconciliationDatabase
{
    /// Tries to find and commit the order that `entry` pays for.
    ///
    /// Candidates are pending orders in the same currency whose amount is within tolerance of the entry amount, that
    /// were created at or before the entry occurred and that had not expired when it occurred. The oldest candidate
    /// wins.
    pub async fn try_match(&self, entry: &LedgerEntry) -> Result<MatchResult, StoreError> {
        if entry.match_state == MatchState::Matched {
            return Ok(existing_match(entry));
        }
        if !entry.kind.is_payment_kind() {
            trace!("🔄️ Entry {} is a {} entry and cannot pay for an order", entry.entry_id, entry.kind);
            return Ok(MatchResult::Unmatched);
        }
        if !entry.amount.is_positive() {
            trace!("🔄️ Entry {} is an outgoing transfer of {}", entry.entry_id, entry.amount);
            return Ok(MatchResult::Unmatched);
        }
        let query = CandidateQuery::for_entry(entry, self.tolerance);
        let candidates = self.db.fetch_match_candidates(&query).await?;
        trace!("🔄️ {} candidate orders for entry {} ({} {})", candidates.len(), entry.entry_id, entry.amount, entry.currency);
        for candidate in candidates {
            match self.db.commit_match(&entry.entry_id, &candidate.order_id, Utc::now()).await? {
                MatchCommit::Committed { order, entry } => {
                    info!("🔄️ Entry {} pays for order {}", entry.entry_id, order.order_id);
                    let order_id = order.order_id.clone();
                    self.producers.publish_order_matched(OrderMatchedEvent::new(order, entry)).await;
                    return Ok(MatchResult::Matched(order_id));
                },
                MatchCommit::OrderClaimed => {
                    debug!("🔄️ Order {} was closed before entry {} could claim it", candidate.order_id, entry.entry_id);
                },
                MatchCommit::EntryClaimed => {
                    let stored = self
                        .db
                        .fetch_entry(&entry.entry_id)
                        .await?
                        .ok_or_else(|| StoreError::EntryNotFound(entry.entry_id.clone()))?;
                    debug!("🔄️ Entry {} was matched by another worker", entry.entry_id);
                    return Ok(existing_match(&stored));
                },
            }
        }
        debug!("🔄️ No open order matches entry {} ({} {})", entry.entry_id, entry.amount, entry.currency);
        Ok(MatchResult::Unmatched)
    }

    /// Retries every unmatched entry that occurred at or after `since`, oldest first. Returns the orders that were
    /// matched during the scan. A store error on one entry is logged and does not stop the scan.
    pub async fn rescan_backlog(&self, since: DateTime<Utc>) -> Result<Vec<OrderId>, StoreError> {
        let backlog = self.db.fetch_unmatched_entries(since).await?;
        let mut matched = Vec::new();
        for entry in backlog.iter().filter(|e| e.is_payment_candidate()) {
            match self.try_match(entry).await {
                Ok(MatchResult::Matched(order_id)) => matched.push(order_id),
                Ok(MatchResult::Unmatched) => {},
                Err(e) => warn!("🔄️ Could not retry backlog entry {}. {e}", entry.entry_id),
            }
        }
        if !matched.is_empty() {
            info!("🔄️ Backlog scan matched {} orders", matched.len());
        }
        Ok(matched)
    }
}

fn existing_match(entry: &LedgerEntry) -> MatchResult {
    match &entry.matched_order_id {
        Some(order_id) => MatchResult::Matched(order_id.clone()),
        None => MatchResult::Unmatched,
    }
}
