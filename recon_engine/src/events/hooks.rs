use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, OrderAnnulledEvent, OrderMatchedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_matched_producer: Vec<EventProducer<OrderMatchedEvent>>,
    pub order_annulled_producer: Vec<EventProducer<OrderAnnulledEvent>>,
}

impl EventProducers {
    pub async fn publish_order_matched(&self, event: OrderMatchedEvent) {
        for producer in &self.order_matched_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_order_annulled(&self, event: OrderAnnulledEvent) {
        for producer in &self.order_annulled_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_order_matched: Option<EventHandler<OrderMatchedEvent>>,
    pub on_order_annulled: Option<EventHandler<OrderAnnulledEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_matched = hooks.on_order_matched.map(|f| EventHandler::new(buffer_size, f));
        let on_order_annulled = hooks.on_order_annulled.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_matched, on_order_annulled }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_matched {
            result.order_matched_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_annulled {
            result.order_annulled_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns every configured handler. Each handler shuts down once all of its producers have been dropped.
    pub fn start_handlers(self) {
        if let Some(handler) = self.on_order_matched {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_annulled {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_matched: Option<Handler<OrderMatchedEvent>>,
    pub on_order_annulled: Option<Handler<OrderAnnulledEvent>>,
}

impl EventHooks {
    pub fn on_order_matched<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderMatchedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_matched = Some(Arc::new(f));
        self
    }

    pub fn on_order_annulled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderAnnulledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_annulled = Some(Arc::new(f));
        self
    }
}
