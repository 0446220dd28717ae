use std::fmt::Debug;

use chrono::Duration;
use log::*;
use url::Url;

use crate::{
    api::{
        errors::OrderFlowError,
        order_objects::{OrderIntake, OrderStatusReport},
    },
    db::traits::OrderStore,
    db_types::{NewPaymentOrder, OrderId, OrderStatusType, PaymentOrder},
    events::{EventProducers, OrderAnnulledEvent},
};

/// How long a new order stays open for payment, unless configured otherwise.
pub const DEFAULT_ORDER_WINDOW_MINUTES: i64 = 60;

/// `OrderFlowApi` is the entry point for the business system: it accepts new orders, reports on their progress and
/// cancels them on request.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
    order_window: Duration,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi (window: {}s)", self.order_window.num_seconds())
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, order_window: Duration::minutes(DEFAULT_ORDER_WINDOW_MINUTES) }
    }

    pub fn with_order_window(mut self, window: Duration) -> Self {
        self.order_window = window;
        self
    }

    pub fn order_window(&self) -> Duration {
        self.order_window
    }
}

impl<B> OrderFlowApi<B>
where B: OrderStore
{
    /// Validates and stores a new pending order. The expiry deadline is `created_at` plus the order window.
    ///
    /// An order id that already exists is rejected with [`OrderFlowError::OrderAlreadyExists`]; the stored order is
    /// never overwritten.
    pub async fn create_order(&self, intake: OrderIntake) -> Result<PaymentOrder, OrderFlowError> {
        let order = self.validate(intake)?;
        let order = self.db.insert_order(order).await?;
        info!(
            "🔄️📦️ Order {} for {} {} accepted. It expires at {}",
            order.order_id, order.amount, order.currency, order.expire_at
        );
        Ok(order)
    }

    fn validate(&self, intake: OrderIntake) -> Result<NewPaymentOrder, OrderFlowError> {
        let order_id =
            intake.order_id.parse::<OrderId>().map_err(|e| OrderFlowError::InvalidOrder(e.to_string()))?;
        if !intake.amount.is_positive() {
            return Err(OrderFlowError::InvalidOrder(format!("The amount must be positive, not {}", intake.amount)));
        }
        let currency = intake.currency.trim();
        if currency.is_empty() || !currency.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(OrderFlowError::InvalidOrder(format!("'{}' is not a valid currency code", intake.currency)));
        }
        let callback_url = validate_callback_url(&intake.callback_url)?;
        let expire_at = intake.created_at + self.order_window;
        Ok(NewPaymentOrder {
            order_id,
            amount: intake.amount,
            currency: currency.to_ascii_uppercase(),
            created_at: intake.created_at,
            expire_at,
            callback_url,
        })
    }

    pub async fn order_status(&self, order_id: &OrderId) -> Result<OrderStatusReport, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        Ok(OrderStatusReport::from(order))
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<PaymentOrder, OrderFlowError> {
        self.db.fetch_order(order_id).await?.ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))
    }

    /// Cancels a pending order. Orders in any other state are left alone and
    /// [`OrderFlowError::CannotCancel`] is returned.
    pub async fn cancel_order(&self, order_id: &OrderId) -> Result<PaymentOrder, OrderFlowError> {
        let cancelled =
            self.db.compare_and_set_status(order_id, OrderStatusType::Pending, OrderStatusType::Cancelled).await?;
        let order = self.fetch_order(order_id).await?;
        if !cancelled {
            debug!("🔄️📦️ Order {order_id} was not cancelled. It is {}", order.status);
            return Err(OrderFlowError::CannotCancel(order_id.clone(), order.status));
        }
        info!("🔄️📦️ Order {order_id} has been cancelled");
        self.producers.publish_order_annulled(OrderAnnulledEvent::new(order.clone(), OrderStatusType::Cancelled)).await;
        Ok(order)
    }
}

fn validate_callback_url(raw: &str) -> Result<String, OrderFlowError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| OrderFlowError::InvalidOrder(format!("'{raw}' is not a valid callback URL. {e}")))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url.to_string()),
        _ => Err(OrderFlowError::InvalidOrder(format!(
            "The callback URL must be an absolute http(s) URL, not '{raw}'"
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn callback_urls() {
        assert!(validate_callback_url("https://shop.example.com/hooks/paid").is_ok());
        assert!(validate_callback_url("http://127.0.0.1:8080/cb").is_ok());
        assert!(validate_callback_url("ftp://example.com/cb").is_err());
        assert!(validate_callback_url("/relative/path").is_err());
        assert!(validate_callback_url("").is_err());
        assert!(validate_callback_url("mailto:ops@example.com").is_err());
    }
}
