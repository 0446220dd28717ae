use chrono::{DateTime, Utc};
use recon_common::Amount;
use serde::{Deserialize, Serialize};

use crate::db_types::{CallbackStatus, EntryId, OrderId, OrderStatusType, PaymentOrder};

/// A payment order as submitted by the business system. Nothing has been validated yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIntake {
    pub order_id: String,
    pub amount: Amount,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub callback_url: String,
}

impl OrderIntake {
    pub fn new(order_id: &str, amount: Amount, currency: &str, callback_url: &str) -> Self {
        Self {
            order_id: order_id.to_string(),
            amount,
            currency: currency.to_string(),
            created_at: Utc::now(),
            callback_url: callback_url.to_string(),
        }
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// What the business system sees when it asks about an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderStatusReport {
    pub order_id: OrderId,
    pub status: OrderStatusType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_entry_id: Option<EntryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_amount: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_at: Option<DateTime<Utc>>,
    pub amount: Amount,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
    pub callback_status: CallbackStatus,
    pub callback_response: Option<String>,
    pub callback_at: Option<DateTime<Utc>>,
}

impl From<PaymentOrder> for OrderStatusReport {
    fn from(order: PaymentOrder) -> Self {
        Self {
            order_id: order.order_id,
            status: order.status,
            matched_entry_id: order.matched_entry_id,
            matched_amount: order.matched_amount,
            matched_at: order.matched_at,
            amount: order.amount,
            currency: order.currency,
            created_at: order.created_at,
            expire_at: order.expire_at,
            callback_status: order.callback_status,
            callback_response: order.callback_response,
            callback_at: order.callback_at,
        }
    }
}
