use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{EntryId, OrderId},
    db::traits::{MatchCommit, OrderStore, TransferStore},
};

/// This trait defines the highest level of behaviour for storage backends supporting the reconciliation engine.
#[allow(async_fn_in_trait)]
pub trait ReconciliationDatabase: TransferStore + OrderStore {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Links the ledger entry to the order in a single atomic transaction:
    /// * the order moves from `pending` to `matched` (compare-and-set on the status) and records the entry id,
    /// * the entry moves from `unmatched` to `matched` (compare-and-set on the match state) and records the order id,
    /// * both sides record `matched_at`.
    ///
    /// If either precondition fails, nothing is written and the reason is returned.
    async fn commit_match(
        &self,
        entry_id: &EntryId,
        order_id: &OrderId,
        matched_at: DateTime<Utc>,
    ) -> Result<MatchCommit, StoreError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Cannot insert duplicate order {0}")]
    DuplicateOrder(OrderId),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Ledger entry {0} does not exist")]
    EntryNotFound(EntryId),
    #[error("Illegal order status transition. {0}")]
    IllegalTransition(String),
}
