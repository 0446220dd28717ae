//! # Callback delivery
//!
//! When an order settles, the [`Notifier`] tells the business system about it by POSTing a signed [`CallbackPayload`]
//! to the order's callback URL. A matched order is reported with `status: success`; an order that expired unpaid is
//! reported with `status: failed`. Cancelled orders get no callback.
//!
//! Delivery is at-least-once: failed attempts are retried with bounded exponential backoff ([`RetryPolicy`]) and the
//! final outcome is written back to the order.
//!
//! The notifier only ever writes callback bookkeeping. It never changes an order's status, so a callback that could
//! not be delivered leaves the order matched (or expired) with `callback_status = failed`.
mod payload;
mod retry;
mod transport;

use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;
pub use payload::{
    sign_payload,
    verify_callback,
    CallbackPayload,
    PaymentOutcome,
    SignatureError,
    DEFAULT_FRESHNESS_SECS,
    SIGNATURE_HEADER,
    TIMESTAMP_HEADER,
};
use recon_common::Secret;
pub use retry::RetryPolicy;
use thiserror::Error;
pub use transport::{CallbackRequest, CallbackResponse, CallbackSender, CallbackTransportError, HttpCallbackSender};

use crate::{
    db::traits::{OrderStore, StoreError},
    db_types::{CallbackRecord, CallbackStatus, OrderId, OrderStatusType, PaymentOrder},
};

/// Response bodies and error messages are truncated to this many characters before they are stored.
pub const RESPONSE_SNAPSHOT_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32, response: CallbackResponse },
    Failed { attempts: u32, last_error: String },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Only matched and expired orders have a callback.
    NoCallbackDue(OrderStatusType),
    AlreadyDelivered,
}

#[derive(Debug, Clone, Error)]
pub enum NotifierError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] StoreError),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Could not build the callback payload. {0}")]
    PayloadError(String),
    #[error("Could not sign the callback payload. {0}")]
    SignatureError(#[from] SignatureError),
}

#[derive(Clone)]
pub struct Notifier<B, C> {
    db: B,
    sender: C,
    secret: Secret,
    policy: RetryPolicy,
}

impl<B, C> Debug for Notifier<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Notifier ({:?})", self.policy)
    }
}

impl<B, C> Notifier<B, C>
where
    B: OrderStore,
    C: CallbackSender,
{
    pub fn new(db: B, sender: C, secret: Secret, policy: RetryPolicy) -> Self {
        Self { db, sender, secret, policy }
    }

    /// Delivers the callback for a matched or expired `order`, retrying as the policy allows, and records the outcome.
    ///
    /// Pending and cancelled orders, and orders whose callback has already been delivered, are skipped without any
    /// network traffic.
    pub async fn notify(&self, order: &PaymentOrder) -> Result<DeliveryOutcome, NotifierError> {
        if !matches!(order.status, OrderStatusType::Matched | OrderStatusType::Expired) {
            debug!("📣️ Order {} is {}. No callback is due.", order.order_id, order.status);
            return Ok(DeliveryOutcome::Skipped(SkipReason::NoCallbackDue(order.status)));
        }
        if order.callback_status == CallbackStatus::Delivered {
            debug!("📣️ The callback for order {} has already been delivered", order.order_id);
            return Ok(DeliveryOutcome::Skipped(SkipReason::AlreadyDelivered));
        }
        let payload = CallbackPayload::for_order(order).ok_or_else(|| {
            NotifierError::PayloadError(format!("Order {} is matched but has no match timestamp", order.order_id))
        })?;
        debug!("📣️ Sending a {:?} callback for {} order {}", payload.status, order.status, order.order_id);
        let body = payload.canonical_json().map_err(|e| NotifierError::PayloadError(e.to_string()))?;
        let signature = sign_payload(&self.secret, &body)?;
        let mut request = CallbackRequest { url: order.callback_url.clone(), body, signature, timestamp: 0 };
        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_attempts {
            request.timestamp = Utc::now().timestamp();
            match self.sender.send(&request).await {
                Ok(response) if response.is_success() => {
                    info!("📣️ Callback for order {} delivered on attempt {attempt}", order.order_id);
                    self.record(&order.order_id, CallbackStatus::Delivered, &response.body).await?;
                    return Ok(DeliveryOutcome::Delivered { attempts: attempt, response });
                },
                Ok(response) => {
                    last_error = format!("HTTP {}: {}", response.status, response.body);
                },
                Err(e) => {
                    last_error = e.to_string();
                },
            }
            warn!(
                "📣️ Callback attempt {attempt}/{} for order {} failed. {last_error}",
                self.policy.max_attempts, order.order_id
            );
            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.delay_after(attempt)).await;
            }
        }
        error!(
            "📣️ Giving up on the callback for order {} after {} attempts. Manual follow-up is needed.",
            order.order_id, self.policy.max_attempts
        );
        self.record(&order.order_id, CallbackStatus::Failed, &last_error).await?;
        Ok(DeliveryOutcome::Failed { attempts: self.policy.max_attempts, last_error })
    }

    async fn record(&self, order_id: &OrderId, status: CallbackStatus, response: &str) -> Result<(), NotifierError> {
        let record = CallbackRecord { status, response: snapshot(response), recorded_at: Utc::now() };
        if !self.db.record_callback(order_id, record).await? {
            warn!("📣️ The callback outcome for order {order_id} was not recorded. It was delivered by another worker.");
        }
        Ok(())
    }

    /// Delivers callbacks for matched and expired orders that have not been attempted and settled before
    /// `now - grace`. This picks up orders whose event-driven delivery never ran, e.g. because the process stopped. Failures on one
    /// order are logged and do not stop the others.
    pub async fn deliver_pending(
        &self,
        grace: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<(OrderId, DeliveryOutcome)>, NotifierError> {
        let pending = self.db.fetch_undelivered_callbacks(now - grace).await?;
        if !pending.is_empty() {
            info!("📣️ {} settled orders are still waiting for their callback", pending.len());
        }
        let mut outcomes = Vec::with_capacity(pending.len());
        for order in pending {
            match self.notify(&order).await {
                Ok(outcome) => outcomes.push((order.order_id, outcome)),
                Err(e) => warn!("📣️ Could not deliver the backlog callback for order {}. {e}", order.order_id),
            }
        }
        Ok(outcomes)
    }

    /// Manually retries the callback for a settled order, typically one whose delivery has failed.
    pub async fn renotify(&self, order_id: &OrderId) -> Result<DeliveryOutcome, NotifierError> {
        let order = self.db.fetch_order(order_id).await?.ok_or_else(|| NotifierError::OrderNotFound(order_id.clone()))?;
        info!("📣️ Redelivering the callback for order {order_id} (currently {})", order.callback_status);
        self.notify(&order).await
    }
}

fn snapshot(s: &str) -> String {
    s.chars().take(RESPONSE_SNAPSHOT_LIMIT).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn snapshots_are_truncated_by_character() {
        assert_eq!(snapshot("ok"), "ok");
        let long = "é".repeat(RESPONSE_SNAPSHOT_LIMIT + 10);
        let s = snapshot(&long);
        assert_eq!(s.chars().count(), RESPONSE_SNAPSHOT_LIMIT);
    }
}
