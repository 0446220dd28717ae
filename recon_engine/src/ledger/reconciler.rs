use std::fmt::Display;

use chrono::Utc;
use log::*;

use crate::{
    api::matcher::{MatchResult, Matcher},
    db::traits::ReconciliationDatabase,
    ledger::{LedgerPoller, LedgerSource, PollError},
};

/// What one reconciliation cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Records returned by the ledger source
    pub fetched: usize,
    /// Entries stored for the first time
    pub ingested: usize,
    /// New entries that matched an order
    pub matched: usize,
    /// Older unmatched entries that matched an order on this cycle's rescan
    pub backlog_matched: usize,
}

impl Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "fetched: {}, new: {}, matched: {}, backlog matched: {}",
            self.fetched, self.ingested, self.matched, self.backlog_matched
        )
    }
}

/// Runs the poll → persist → match pipeline.
pub struct Reconciler<S, B> {
    poller: LedgerPoller<S, B>,
    matcher: Matcher<B>,
}

impl<S, B> Reconciler<S, B>
where
    S: LedgerSource,
    B: ReconciliationDatabase,
{
    pub fn new(poller: LedgerPoller<S, B>, matcher: Matcher<B>) -> Self {
        Self { poller, matcher }
    }

    /// One full cycle:
    /// 1. poll the source for unseen entries,
    /// 2. persist them before any matching is attempted,
    /// 3. try to match each new entry, oldest first,
    /// 4. rescan unmatched entries in the lookback window against orders that may have arrived since.
    ///
    /// A transient or authentication failure in step 1 aborts the cycle before anything is written. Failures while
    /// matching individual entries are logged and leave those entries for the next rescan.
    pub async fn run_cycle(&self) -> Result<CycleReport, PollError> {
        let batch = self.poller.poll().await?;
        let mut report = CycleReport { fetched: batch.fetched, ..Default::default() };
        let stored = self.poller.ingest(batch.entries).await;
        report.ingested = stored.len();
        for entry in &stored {
            match self.matcher.try_match(entry).await {
                Ok(MatchResult::Matched(_)) => report.matched += 1,
                Ok(MatchResult::Unmatched) => {},
                Err(e) => warn!("🔄️ Matching entry {} failed. It will be retried on the next cycle. {e}", entry.entry_id),
            }
        }
        let since = Utc::now() - self.poller.lookback();
        match self.matcher.rescan_backlog(since).await {
            Ok(matched) => report.backlog_matched = matched.len(),
            Err(e) => warn!("🔄️ The backlog rescan failed. {e}"),
        }
        debug!("🔄️ Reconciliation cycle complete. {report}");
        Ok(report)
    }
}
