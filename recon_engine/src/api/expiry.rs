use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db::traits::{OrderStore, StoreError},
    db_types::OrderStatusType,
    events::{EventProducers, OrderAnnulledEvent},
};

/// Closes pending orders whose deadline has passed.
pub struct ExpirySweeper<B> {
    db: B,
    producers: EventProducers,
}

impl<B> ExpirySweeper<B>
where B: OrderStore
{
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    /// Expires every pending order with `expire_at <= now` and returns how many were expired. An order that was
    /// matched or cancelled between the scan and the update is skipped.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let overdue = self.db.fetch_overdue_orders(now).await?;
        let mut count = 0;
        for order in overdue {
            let expired = self
                .db
                .compare_and_set_status(&order.order_id, OrderStatusType::Pending, OrderStatusType::Expired)
                .await?;
            if expired {
                count += 1;
                debug!("🕰️ Order {} expired at {}", order.order_id, order.expire_at);
                self.producers.publish_order_annulled(OrderAnnulledEvent::new(order, OrderStatusType::Expired)).await;
            } else {
                debug!("🕰️ Order {} changed state before it could be expired", order.order_id);
            }
        }
        if count > 0 {
            info!("🕰️ {count} orders have expired");
        }
        Ok(count)
    }
}
