use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db::{sqlite::SqliteDatabaseError, traits::CandidateQuery},
    db_types::{
        CallbackRecord,
        CallbackStatus,
        EntryId,
        NewPaymentOrder,
        OrderId,
        OrderStatusType,
        PaymentOrder,
    },
};

/// Inserts a new order. The unique index on `order_id` is the duplicate check, so two concurrent inserts of the same
/// id cannot both succeed.
pub async fn insert_order(
    order: NewPaymentOrder,
    conn: &mut SqliteConnection,
) -> Result<PaymentOrder, SqliteDatabaseError> {
    let order_id = order.order_id.clone();
    let result = sqlx::query_as::<_, PaymentOrder>(
        r#"
            INSERT INTO payment_orders (order_id, amount, currency, created_at, expire_at, callback_url, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *;
        "#,
    )
    .bind(&order.order_id)
    .bind(order.amount)
    .bind(&order.currency)
    .bind(order.created_at)
    .bind(order.expire_at)
    .bind(&order.callback_url)
    .bind(Utc::now())
    .fetch_one(conn)
    .await;
    match result {
        Ok(order) => {
            trace!("🗃️ Order {} stored with id {}", order.order_id, order.id);
            Ok(order)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(SqliteDatabaseError::DuplicateOrder(order_id)),
        Err(e) => Err(SqliteDatabaseError::from(e)),
    }
}

pub async fn fetch_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentOrder>, SqliteDatabaseError> {
    let order = sqlx::query_as("SELECT * FROM payment_orders WHERE order_id = ?")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Pending orders that the described entry could pay for, oldest first. Ties on `created_at` fall back to insertion
/// order.
pub async fn fetch_match_candidates(
    query: &CandidateQuery,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentOrder>, SqliteDatabaseError> {
    let orders = sqlx::query_as(
        r#"
            SELECT * FROM payment_orders
            WHERE status = ?
              AND currency = ?
              AND amount BETWEEN ? AND ?
              AND created_at <= ?
              AND expire_at > ?
            ORDER BY created_at ASC, id ASC;
        "#,
    )
    .bind(OrderStatusType::Pending)
    .bind(&query.currency)
    .bind(query.min_amount)
    .bind(query.max_amount)
    .bind(query.occurred_at)
    .bind(query.occurred_at)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

pub async fn fetch_overdue_orders(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentOrder>, SqliteDatabaseError> {
    let orders = sqlx::query_as(
        r#"
            SELECT * FROM payment_orders
            WHERE status = ? AND expire_at <= ?
            ORDER BY expire_at ASC, id ASC;
        "#,
    )
    .bind(OrderStatusType::Pending)
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

/// Changes the order status from `expected` to `new`. Returns `false` if the order was not in the `expected` state.
pub async fn compare_and_set_status(
    order_id: &OrderId,
    expected: OrderStatusType,
    new: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    if new == OrderStatusType::Matched {
        return Err(SqliteDatabaseError::IllegalTransition(format!(
            "Order {order_id} can only become matched together with a ledger entry"
        )));
    }
    let result = sqlx::query(
        r#"
            UPDATE payment_orders SET status = ?, updated_at = ?
            WHERE order_id = ? AND status = ?;
        "#,
    )
    .bind(new)
    .bind(Utc::now())
    .bind(order_id)
    .bind(expected)
    .execute(conn)
    .await?;
    let changed = result.rows_affected() == 1;
    if changed {
        debug!("🗃️ Order {order_id} status changed from {expected} to {new}");
    }
    Ok(changed)
}

/// Marks a pending order as matched against the given entry and copies the entry amount into `matched_amount`.
/// Returns `false` if the order was not pending.
///
/// This is not atomic by itself. Call it inside a transaction together with the ledger entry update.
pub async fn claim_order(
    order_id: &OrderId,
    entry_id: &EntryId,
    matched_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            UPDATE payment_orders
            SET status = ?,
                matched_entry_id = ?,
                matched_amount = (SELECT amount FROM ledger_entries WHERE entry_id = ?),
                matched_at = ?,
                updated_at = ?
            WHERE order_id = ? AND status = ?;
        "#,
    )
    .bind(OrderStatusType::Matched)
    .bind(entry_id)
    .bind(entry_id)
    .bind(matched_at)
    .bind(matched_at)
    .bind(order_id)
    .bind(OrderStatusType::Pending)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Settled orders (matched or expired) whose callback has not been attempted and that settled before
/// `settled_before`.
pub async fn fetch_undelivered_callbacks(
    settled_before: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentOrder>, SqliteDatabaseError> {
    let orders = sqlx::query_as(
        r#"
            SELECT * FROM payment_orders
            WHERE status IN (?, ?) AND callback_status = ? AND updated_at < ?
            ORDER BY updated_at ASC, id ASC;
        "#,
    )
    .bind(OrderStatusType::Matched)
    .bind(OrderStatusType::Expired)
    .bind(CallbackStatus::NotAttempted)
    .bind(settled_before)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

/// Writes the callback outcome for a matched or expired order. A delivered callback is final and is never
/// overwritten.
pub async fn record_callback(
    order_id: &OrderId,
    record: CallbackRecord,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            UPDATE payment_orders
            SET callback_status = ?, callback_response = ?, callback_at = ?, updated_at = ?
            WHERE order_id = ? AND status IN (?, ?) AND callback_status != ?;
        "#,
    )
    .bind(record.status)
    .bind(&record.response)
    .bind(record.recorded_at)
    .bind(record.recorded_at)
    .bind(order_id)
    .bind(OrderStatusType::Matched)
    .bind(OrderStatusType::Expired)
    .bind(CallbackStatus::Delivered)
    .execute(conn)
    .await?;
    let updated = result.rows_affected() == 1;
    if updated {
        debug!("🗃️ Callback for order {order_id} recorded as {}", record.status);
    }
    Ok(updated)
}
