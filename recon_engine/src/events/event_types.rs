use serde::Serialize;

use crate::db_types::{LedgerEntry, OrderStatusType, PaymentOrder};

/// Published after a ledger entry has been committed as the payment for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderMatchedEvent {
    pub order: PaymentOrder,
    pub entry: LedgerEntry,
}

impl OrderMatchedEvent {
    pub fn new(order: PaymentOrder, entry: LedgerEntry) -> Self {
        Self { order, entry }
    }
}

/// Published when a pending order is closed without a payment, either because it expired or because it was cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderAnnulledEvent {
    pub order: PaymentOrder,
    pub status: OrderStatusType,
}

impl OrderAnnulledEvent {
    pub fn new(mut order: PaymentOrder, status: OrderStatusType) -> Self {
        order.status = status;
        Self { order, status }
    }
}
