//! Background jobs run by the reconciliation daemon. Each `start_*` function spawns a task that runs until the runtime
//! shuts down; only the reconciliation worker can stop by itself.
use std::time::Duration;

use chrono::Utc;
use log::*;
use recon_engine::{
    events::EventProducers,
    notifier::HttpCallbackSender,
    traits::TransferStore,
    ExpirySweeper,
    Notifier,
    PollError,
    Reconciler,
    SqliteDatabase,
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::sources::FileLedgerSource;

pub type ServerReconciler = Reconciler<FileLedgerSource, SqliteDatabase>;
pub type ServerNotifier = Notifier<SqliteDatabase, HttpCallbackSender>;

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut timer = tokio::time::interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Starts the poll → persist → match loop. Cycles never overlap: a slow cycle delays the next tick.
///
/// Transient failures skip the cycle. The task ends, returning the error, when the ledger source rejects our
/// credentials.
pub fn start_reconciliation_worker(reconciler: ServerReconciler, interval: Duration) -> JoinHandle<PollError> {
    tokio::spawn(async move {
        let mut timer = ticker(interval);
        info!("📡️ Ledger polling worker started. Polling every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            match reconciler.run_cycle().await {
                Ok(report) if report.ingested > 0 || report.backlog_matched > 0 => info!("📡️ {report}"),
                Ok(report) => trace!("📡️ {report}"),
                Err(e) if e.is_fatal() => {
                    error!("📡️ Ledger polling has stopped. {e}");
                    return e;
                },
                Err(e) => warn!("📡️ Skipping this reconciliation cycle. {e}"),
            }
        }
    })
}

/// Starts the expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_expiry_worker(db: SqliteDatabase, producers: EventProducers, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = ticker(interval);
        let sweeper = ExpirySweeper::new(db, producers);
        info!("🕰️ Order expiry worker started");
        loop {
            timer.tick().await;
            debug!("🕰️ Running order expiry job");
            match sweeper.sweep(Utc::now()).await {
                Ok(0) => trace!("🕰️ No orders expired"),
                Ok(n) => info!("🕰️ {n} orders expired"),
                Err(e) => error!("🕰️ Error running order expiry job: {e}"),
            }
        }
    })
}

/// Starts the job that delivers callbacks for matches that the event-driven delivery missed.
pub fn start_callback_backlog_worker(
    notifier: ServerNotifier,
    interval: Duration,
    grace: chrono::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = ticker(interval);
        info!("📣️ Callback backlog worker started");
        loop {
            timer.tick().await;
            match notifier.deliver_pending(grace, Utc::now()).await {
                Ok(outcomes) if outcomes.is_empty() => trace!("📣️ No callbacks are waiting"),
                Ok(outcomes) => info!("📣️ Processed {} waiting callbacks", outcomes.len()),
                Err(e) => error!("📣️ Could not fetch the callback backlog. {e}"),
            }
        }
    })
}

/// Starts the job that deletes unmatched ledger entries observed more than `retention` ago.
pub fn start_pruning_worker(db: SqliteDatabase, interval: Duration, retention: chrono::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = ticker(interval);
        info!("🗃️ Ledger entry pruning worker started. Unmatched entries are kept for {}h", retention.num_hours());
        loop {
            timer.tick().await;
            match db.prune_unmatched_entries(Utc::now() - retention).await {
                Ok(0) => trace!("🗃️ No ledger entries pruned"),
                Ok(n) => info!("🗃️ Pruned {n} stale unmatched ledger entries"),
                Err(e) => error!("🗃️ Error pruning ledger entries: {e}"),
            }
        }
    })
}
