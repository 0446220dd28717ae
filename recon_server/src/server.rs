use std::time::Duration;

use log::*;
use recon_engine::{
    db_types::OrderStatusType,
    events::{EventHandlers, EventHooks},
    notifier::HttpCallbackSender,
    traits::ReconciliationDatabase,
    LedgerPoller,
    Matcher,
    Notifier,
    Reconciler,
    SqliteDatabase,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    sources::FileLedgerSource,
    workers::{
        start_callback_backlog_worker,
        start_expiry_worker,
        start_pruning_worker,
        start_reconciliation_worker,
        ServerNotifier,
    },
};

const EVENT_BUFFER_SIZE: usize = 25;
const PRUNING_INTERVAL: Duration = Duration::from_secs(3600);

/// Opens the store, applying any outstanding migrations.
pub async fn open_database(config: &ServerConfig) -> Result<SqliteDatabase, ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await?;
    Ok(db)
}

pub fn create_notifier(config: &ServerConfig, db: SqliteDatabase) -> Result<ServerNotifier, ServerError> {
    let secret = config.require_callback_secret()?.clone();
    let sender = HttpCallbackSender::new(config.callback.timeout)
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    Ok(Notifier::new(db, sender, secret, config.callback.retry_policy()))
}

/// Runs the reconciliation daemon until the ledger source rejects our credentials or the process is interrupted.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let ledger_file = config.validate_for_run()?;
    let mut db = open_database(&config).await?;
    info!("🗃️ Connected to {}", config.database_url);
    let notifier = create_notifier(&config, db.clone())?;

    let hooks = create_event_hooks(notifier.clone());
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, hooks);
    let producers = handlers.producers();
    handlers.start_handlers();

    let source = FileLedgerSource::new(ledger_file);
    info!("📡️ Reading the ledger from {}", source.path().display());
    let poller = LedgerPoller::new(source, db.clone())
        .with_lookback(config.ledger_lookback)
        .with_fetch_timeout(config.fetch_timeout);
    let matcher = Matcher::new(db.clone(), producers.clone()).with_tolerance(config.match_tolerance);
    let reconciler = Reconciler::new(poller, matcher);

    let poll_worker = start_reconciliation_worker(reconciler, config.poll_interval);
    let _expiry = start_expiry_worker(db.clone(), producers, config.sweep_interval);
    let _backlog = start_callback_backlog_worker(notifier, config.callback.sweep_interval, config.callback.grace);
    if let Some(retention) = config.entry_retention {
        let _pruning = start_pruning_worker(db.clone(), PRUNING_INTERVAL, retention);
    }

    let result = tokio::select! {
        stopped = poll_worker => match stopped {
            Ok(e) => Err(ServerError::LedgerAuthentication(e.to_string())),
            Err(e) => Err(ServerError::Unspecified(format!("The polling worker panicked. {e}"))),
        },
        signal = tokio::signal::ctrl_c() => {
            info!("🚀️ Shutdown requested");
            signal.map_err(ServerError::from)
        },
    };
    if let Err(e) = db.close().await {
        warn!("🗃️ The database did not close cleanly. {e}");
    }
    result
}

/// Matched orders get a `success` callback and expired orders a `failed` one. Cancellations are only logged.
fn create_event_hooks(notifier: ServerNotifier) -> EventHooks {
    let mut hooks = EventHooks::default();
    let annulled_notifier = notifier.clone();
    hooks
        .on_order_matched(move |ev| {
            let notifier = notifier.clone();
            Box::pin(async move {
                debug!("📬️ Order {} was paid by ledger entry {}", ev.order.order_id, ev.entry.entry_id);
                if let Err(e) = notifier.notify(&ev.order).await {
                    error!("📬️ Could not deliver the callback for order {}. {e}", ev.order.order_id);
                }
            })
        })
        .on_order_annulled(move |ev| {
            let notifier = annulled_notifier.clone();
            Box::pin(async move {
                if ev.status != OrderStatusType::Expired {
                    info!("📬️ Order {} is now {}. No callback is sent.", ev.order.order_id, ev.status);
                    return;
                }
                debug!("📬️ Order {} expired unpaid", ev.order.order_id);
                if let Err(e) = notifier.notify(&ev.order).await {
                    error!("📬️ Could not deliver the expiry callback for order {}. {e}", ev.order.order_id);
                }
            })
        });
    hooks
}
