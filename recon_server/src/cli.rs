use std::{env, env::VarError, path::PathBuf};

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use log::*;
use recon_common::Amount;
use recon_engine::{
    db_types::OrderId,
    events::EventProducers,
    notifier::{verify_callback, DEFAULT_FRESHNESS_SECS},
    order_objects::OrderIntake,
    DeliveryOutcome,
    OrderFlowApi,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    server::{create_notifier, open_database, run_server},
};

#[derive(Parser, Debug)]
#[command(version, about = "Reconciles exchange ledger entries against payment orders")]
pub struct Arguments {
    /// What to do. Runs the reconciliation daemon if omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[clap(name = "run", about = "Run the reconciliation daemon")]
    Run,
    #[clap(name = "create-order", about = "Register a new payment order")]
    CreateOrder(CreateOrderParams),
    #[clap(name = "order-status", about = "Print the status of an order as JSON")]
    OrderStatus {
        order_id: OrderId,
    },
    #[clap(name = "cancel-order", about = "Cancel a pending order")]
    CancelOrder {
        order_id: OrderId,
    },
    #[clap(name = "renotify", about = "Deliver the match callback for an order again")]
    Renotify {
        order_id: OrderId,
    },
    #[clap(name = "verify-callback", about = "Check a callback signature the way a recipient would")]
    VerifyCallback(VerifyCallbackParams),
    #[clap(name = "env", about = "Show help on the environment variables and their current values")]
    Env,
}

#[derive(Debug, Args)]
pub struct CreateOrderParams {
    /// The business system's order id
    #[arg(short = 'o', long = "order")]
    order_id: String,
    /// The expected payment, e.g. 88.02
    #[arg(short = 'a', long = "amount")]
    amount: Amount,
    #[arg(short = 'c', long = "currency")]
    currency: String,
    /// Where the signed match callback is POSTed
    #[arg(short = 'u', long = "callback-url")]
    callback_url: String,
    /// When the order was created (RFC 3339). Defaults to now.
    #[arg(short = 't', long = "created-at")]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Args)]
pub struct VerifyCallbackParams {
    /// A file containing the exact callback body that was received
    #[arg(short = 'b', long = "body")]
    body_file: PathBuf,
    /// The value of the signature header
    #[arg(short = 's', long = "signature")]
    signature: String,
    /// The value of the timestamp header
    #[arg(short = 't', long = "timestamp")]
    timestamp: String,
    /// How old the timestamp may be, in seconds
    #[arg(short = 'w', long = "window", default_value_t = DEFAULT_FRESHNESS_SECS)]
    window: i64,
}

pub async fn handle_command(command: Command, config: ServerConfig) -> Result<(), ServerError> {
    match command {
        Command::Run => run_server(config).await,
        Command::CreateOrder(params) => create_order(params, &config).await,
        Command::OrderStatus { order_id } => {
            let api = order_api(&config).await?;
            let report = api.order_status(&order_id).await?;
            let json = serde_json::to_string_pretty(&report).map_err(|e| ServerError::Unspecified(e.to_string()))?;
            println!("{json}");
            Ok(())
        },
        Command::CancelOrder { order_id } => {
            let order = order_api(&config).await?.cancel_order(&order_id).await?;
            println!("Order {} is now {}", order.order_id, order.status);
            Ok(())
        },
        Command::Renotify { order_id } => renotify(order_id, &config).await,
        Command::VerifyCallback(params) => verify(params, &config).await,
        Command::Env => {
            display_envs();
            Ok(())
        },
    }
}

async fn order_api(config: &ServerConfig) -> Result<OrderFlowApi<recon_engine::SqliteDatabase>, ServerError> {
    let db = open_database(config).await?;
    Ok(OrderFlowApi::new(db, EventProducers::default()).with_order_window(config.order_window))
}

async fn create_order(params: CreateOrderParams, config: &ServerConfig) -> Result<(), ServerError> {
    let mut intake = OrderIntake::new(&params.order_id, params.amount, &params.currency, &params.callback_url);
    if let Some(created_at) = params.created_at {
        intake = intake.created_at(created_at);
    }
    let order = order_api(config).await?.create_order(intake).await?;
    println!("Order {} created. It expires at {}", order.order_id, order.expire_at);
    Ok(())
}

async fn renotify(order_id: OrderId, config: &ServerConfig) -> Result<(), ServerError> {
    let db = open_database(config).await?;
    let notifier = create_notifier(config, db)?;
    match notifier.renotify(&order_id).await? {
        DeliveryOutcome::Delivered { attempts, response } => {
            println!("Delivered after {attempts} attempt(s). HTTP {}", response.status);
            Ok(())
        },
        DeliveryOutcome::Failed { attempts, last_error } => {
            Err(ServerError::Unspecified(format!("Delivery failed after {attempts} attempt(s). {last_error}")))
        },
        DeliveryOutcome::Skipped(reason) => {
            println!("Nothing to deliver: {reason:?}");
            Ok(())
        },
    }
}

async fn verify(params: VerifyCallbackParams, config: &ServerConfig) -> Result<(), ServerError> {
    let secret = config.require_callback_secret()?;
    let body = tokio::fs::read(&params.body_file).await?;
    let window = chrono::Duration::seconds(params.window);
    match verify_callback(secret, &body, &params.signature, &params.timestamp, Utc::now(), window) {
        Ok(()) => {
            println!("The callback signature is valid");
            Ok(())
        },
        Err(e) => {
            debug!("Callback verification failed for {}", params.body_file.display());
            Err(ServerError::InvalidInput(e.to_string()))
        },
    }
}

fn display_envs() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 15] = [
        "RUST_LOG",
        "RECON_DATABASE_URL",
        "RECON_LEDGER_FILE",
        "RECON_POLL_INTERVAL",
        "RECON_LEDGER_LOOKBACK",
        "RECON_FETCH_TIMEOUT",
        "RECON_SWEEP_INTERVAL",
        "RECON_ORDER_WINDOW",
        "RECON_MATCH_TOLERANCE",
        "RECON_CALLBACK_TIMEOUT",
        "RECON_CALLBACK_MAX_ATTEMPTS",
        "RECON_CALLBACK_INITIAL_BACKOFF",
        "RECON_CALLBACK_MAX_BACKOFF",
        "RECON_CALLBACK_SWEEP_INTERVAL",
        "RECON_ENTRY_RETENTION",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    });
    let secret_state = if env::var("RECON_CALLBACK_SECRET").is_ok() { "Set" } else { "Not set" };
    println!("  {:<35} {secret_state:<15}", "RECON_CALLBACK_SECRET");
}
