use chrono::{DateTime, Utc};

use crate::{
    db_types::{CallbackRecord, NewPaymentOrder, OrderId, OrderStatusType, PaymentOrder},
    db::traits::{CandidateQuery, StoreError},
};

/// Durable storage for payment orders.
#[allow(async_fn_in_trait)]
pub trait OrderStore: Clone {
    /// Stores a new order with `pending` status. If the order id already exists, [`StoreError::DuplicateOrder`] is
    /// returned and the stored order is left as it was.
    async fn insert_order(&self, order: NewPaymentOrder) -> Result<PaymentOrder, StoreError>;

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<PaymentOrder>, StoreError>;

    /// Pending orders that satisfy `query`, oldest `created_at` first.
    async fn fetch_match_candidates(&self, query: &CandidateQuery) -> Result<Vec<PaymentOrder>, StoreError>;

    /// Pending orders whose `expire_at` is at or before `now`.
    async fn fetch_overdue_orders(&self, now: DateTime<Utc>) -> Result<Vec<PaymentOrder>, StoreError>;

    /// Sets the order status to `new` only if it is currently `expected`. Returns `false` if the precondition did not
    /// hold (or the order does not exist), in which case nothing is changed.
    ///
    /// Transitions into `matched` are rejected with [`StoreError::IllegalTransition`]; use
    /// [`crate::traits::ReconciliationDatabase::commit_match`] for that.
    async fn compare_and_set_status(
        &self,
        order_id: &OrderId,
        expected: OrderStatusType,
        new: OrderStatusType,
    ) -> Result<bool, StoreError>;

    /// Matched or expired orders whose callback has not been attempted and whose last status change happened before
    /// `settled_before`.
    async fn fetch_undelivered_callbacks(&self, settled_before: DateTime<Utc>) -> Result<Vec<PaymentOrder>, StoreError>;

    /// Writes callback delivery bookkeeping. Only matched or expired orders whose callback has not been delivered yet
    /// are updated. Returns `false` if no update was made.
    async fn record_callback(&self, order_id: &OrderId, record: CallbackRecord) -> Result<bool, StoreError>;
}
