//! Simple stateless pub-sub event handler
//!
//! Components of the engine publish events through an [`EventProducer`]. Each [`EventHandler`] owns the receiving end
//! of a bounded channel and runs its handler function for every event it receives. Handlers have no access to the
//! engine's internal state; all they receive is the event itself.
//!
//! Handlers run concurrently. When the last producer is dropped, the handler stops accepting events and waits for the
//! jobs that are still running before it returns.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // The handler must not keep its own sender alive, or it would never see the channel close.
        drop(self.sender);
        let mut jobs = JoinSet::new();
        loop {
            tokio::select! {
                ev = self.listener.recv() => match ev {
                    Some(ev) => {
                        trace!("📬️ Handling event");
                        let handler = Arc::clone(&self.handler);
                        jobs.spawn(async move { (handler)(ev).await });
                    },
                    None => break,
                },
                Some(done) = jobs.join_next(), if !jobs.is_empty() => log_job_result(done),
            }
        }
        debug!("📬️ All producers have gone away. Waiting for {} jobs to complete", jobs.len());
        while let Some(done) = jobs.join_next().await {
            log_job_result(done);
        }
        debug!("📬️ Event handler has shut down");
    }
}

fn log_job_result(result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => trace!("📬️ Event handled"),
        Err(e) => warn!("📬️ An event handler job did not complete: {e}"),
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to send event: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[tokio::test]
    async fn handler_drains_all_events_before_shutdown() {
        let _ = env_logger::try_init();
        let total = Arc::new(AtomicU64::new(0));
        let seen = Arc::new(AtomicU64::new(0));
        let (t2, s2) = (total.clone(), seen.clone());
        let handler = Arc::new(move |v: u64| {
            let total = total.clone();
            let seen = seen.clone();
            Box::pin(async move {
                tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
                total.fetch_add(v, Ordering::SeqCst);
                seen.fetch_add(1, Ordering::SeqCst);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let event_handler = EventHandler::new(1, handler);
        let odd = event_handler.subscribe();
        let even = event_handler.subscribe();
        tokio::spawn(async move {
            for i in 0..5 {
                odd.publish_event(i * 2 + 1).await;
            }
        });
        tokio::spawn(async move {
            for i in 0..5 {
                even.publish_event(i * 2).await;
            }
        });

        event_handler.start_handler().await;
        assert_eq!(s2.load(Ordering::SeqCst), 10);
        assert_eq!(t2.load(Ordering::SeqCst), 45);
    }
}
