//! Server configuration.
//!
//! Every setting comes from an environment variable (a `.env` file is loaded first, if present). Optional settings
//! fall back to a default with a log message; mandatory settings are checked by [`ServerConfig::validate_for_run`].
//!
//! | Variable                          | Unit    | Default                        |
//! |-----------------------------------|---------|--------------------------------|
//! | `RECON_DATABASE_URL`              |         | `sqlite://data/recon_store.db` |
//! | `RECON_LEDGER_FILE`               | path    | required for `run`             |
//! | `RECON_POLL_INTERVAL`             | seconds | 10                             |
//! | `RECON_LEDGER_LOOKBACK`           | minutes | 120                            |
//! | `RECON_FETCH_TIMEOUT`             | seconds | 30                             |
//! | `RECON_SWEEP_INTERVAL`            | seconds | 60                             |
//! | `RECON_ORDER_WINDOW`              | minutes | 60                             |
//! | `RECON_MATCH_TOLERANCE`           | amount  | 0                              |
//! | `RECON_CALLBACK_SECRET`           |         | required for `run`             |
//! | `RECON_CALLBACK_TIMEOUT`          | seconds | 5                              |
//! | `RECON_CALLBACK_MAX_ATTEMPTS`     | count   | 5                              |
//! | `RECON_CALLBACK_INITIAL_BACKOFF`  | seconds | 1                              |
//! | `RECON_CALLBACK_MAX_BACKOFF`      | seconds | 30                             |
//! | `RECON_CALLBACK_SWEEP_INTERVAL`   | seconds | 60                             |
//! | `RECON_ENTRY_RETENTION`           | hours   | unset (never prune)            |
use std::{env, path::PathBuf, time::Duration};

use log::*;
use recon_common::{helpers::parse_seconds, Amount, Secret};
use recon_engine::{
    ledger::{DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_LOOKBACK_HOURS},
    RetryPolicy,
    DEFAULT_ORDER_WINDOW_MINUTES,
};

use crate::errors::ServerError;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/recon_store.db";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CALLBACK_MAX_ATTEMPTS: i64 = 5;
const DEFAULT_CALLBACK_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const DEFAULT_CALLBACK_MAX_BACKOFF: Duration = Duration::from_secs(30);
const DEFAULT_CALLBACK_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Matched orders younger than this are left to the event-driven delivery.
const DEFAULT_CALLBACK_GRACE_MINUTES: i64 = 5;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub database_url: String,
    /// The exported ledger file the JSON ledger source reads on every cycle
    pub ledger_file: Option<PathBuf>,
    pub poll_interval: Duration,
    pub ledger_lookback: chrono::Duration,
    pub fetch_timeout: Duration,
    pub sweep_interval: Duration,
    pub order_window: chrono::Duration,
    pub match_tolerance: Amount,
    pub callback: CallbackConfig,
    /// Unmatched ledger entries observed longer ago than this are deleted. `None` keeps them forever.
    pub entry_retention: Option<chrono::Duration>,
}

#[derive(Clone, Debug)]
pub struct CallbackConfig {
    pub secret: Secret,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub sweep_interval: Duration,
    pub grace: chrono::Duration,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            secret: Secret::default(),
            timeout: DEFAULT_CALLBACK_TIMEOUT,
            max_attempts: DEFAULT_CALLBACK_MAX_ATTEMPTS as u32,
            initial_backoff: DEFAULT_CALLBACK_INITIAL_BACKOFF,
            max_backoff: DEFAULT_CALLBACK_MAX_BACKOFF,
            sweep_interval: DEFAULT_CALLBACK_SWEEP_INTERVAL,
            grace: chrono::Duration::minutes(DEFAULT_CALLBACK_GRACE_MINUTES),
        }
    }
}

impl CallbackConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.initial_backoff, self.max_backoff)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            ledger_file: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            ledger_lookback: chrono::Duration::hours(DEFAULT_LOOKBACK_HOURS),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            order_window: chrono::Duration::minutes(DEFAULT_ORDER_WINDOW_MINUTES),
            match_tolerance: Amount::default(),
            callback: CallbackConfig::default(),
            entry_retention: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any name → value lookup. Invalid values are logged and replaced by defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where F: Fn(&str) -> Option<String> {
        let defaults = Self::default();
        let database_url = lookup("RECON_DATABASE_URL").unwrap_or_else(|| {
            info!("🪛️ RECON_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            defaults.database_url.clone()
        });
        let ledger_file = lookup("RECON_LEDGER_FILE").filter(|s| !s.trim().is_empty()).map(PathBuf::from);
        if ledger_file.is_none() {
            warn!("🪛️ RECON_LEDGER_FILE is not set. The reconciliation daemon cannot poll the ledger without it.");
        }
        let poll_interval = seconds(&lookup, "RECON_POLL_INTERVAL", defaults.poll_interval);
        let ledger_lookback = chrono::Duration::minutes(whole_number(
            &lookup,
            "RECON_LEDGER_LOOKBACK",
            defaults.ledger_lookback.num_minutes(),
            "minutes",
        ));
        let fetch_timeout = seconds(&lookup, "RECON_FETCH_TIMEOUT", defaults.fetch_timeout);
        let sweep_interval = seconds(&lookup, "RECON_SWEEP_INTERVAL", defaults.sweep_interval);
        let order_window = chrono::Duration::minutes(whole_number(
            &lookup,
            "RECON_ORDER_WINDOW",
            defaults.order_window.num_minutes(),
            "minutes",
        ));
        let match_tolerance = match lookup("RECON_MATCH_TOLERANCE").map(|s| s.parse::<Amount>()) {
            Some(Ok(t)) if t.value() >= 0 => t,
            Some(Ok(t)) => {
                warn!("🪛️ RECON_MATCH_TOLERANCE cannot be negative ({t}). Exact matching will be used.");
                Amount::default()
            },
            Some(Err(e)) => {
                warn!("🪛️ Invalid configuration value for RECON_MATCH_TOLERANCE. {e}. Exact matching will be used.");
                Amount::default()
            },
            None => Amount::default(),
        };
        let secret = lookup("RECON_CALLBACK_SECRET").as_deref().and_then(Secret::from_config).unwrap_or_else(|| {
            warn!("🪛️ RECON_CALLBACK_SECRET is not set. Callbacks cannot be signed without it.");
            Secret::default()
        });
        let dc = defaults.callback;
        let callback = CallbackConfig {
            secret,
            timeout: seconds(&lookup, "RECON_CALLBACK_TIMEOUT", dc.timeout),
            max_attempts: max_attempts(&lookup),
            initial_backoff: seconds(&lookup, "RECON_CALLBACK_INITIAL_BACKOFF", dc.initial_backoff),
            max_backoff: seconds(&lookup, "RECON_CALLBACK_MAX_BACKOFF", dc.max_backoff),
            sweep_interval: seconds(&lookup, "RECON_CALLBACK_SWEEP_INTERVAL", dc.sweep_interval),
            grace: dc.grace,
        };
        let entry_retention = lookup("RECON_ENTRY_RETENTION").and_then(|s| match s.trim().parse::<i64>() {
            Ok(h) if h > 0 => {
                info!("🪛️ Unmatched ledger entries will be pruned after {h} hours");
                Some(chrono::Duration::hours(h))
            },
            _ => {
                warn!("🪛️ Invalid configuration value for RECON_ENTRY_RETENTION ({s}). Entries will not be pruned.");
                None
            },
        });
        Self {
            database_url,
            ledger_file,
            poll_interval,
            ledger_lookback,
            fetch_timeout,
            sweep_interval,
            order_window,
            match_tolerance,
            callback,
            entry_retention,
        }
    }

    /// The daemon cannot start without a ledger file to poll and a secret to sign callbacks with.
    pub fn validate_for_run(&self) -> Result<PathBuf, ServerError> {
        if self.callback.secret.is_empty() {
            return Err(ServerError::ConfigurationError("RECON_CALLBACK_SECRET must be set".into()));
        }
        self.ledger_file.clone().ok_or_else(|| ServerError::ConfigurationError("RECON_LEDGER_FILE must be set".into()))
    }

    /// Callbacks are signed, so anything that delivers them needs the secret.
    pub fn require_callback_secret(&self) -> Result<&Secret, ServerError> {
        if self.callback.secret.is_empty() {
            Err(ServerError::ConfigurationError("RECON_CALLBACK_SECRET must be set".into()))
        } else {
            Ok(&self.callback.secret)
        }
    }
}

fn seconds<F>(lookup: &F, name: &str, default: Duration) -> Duration
where F: Fn(&str) -> Option<String> {
    match lookup(name) {
        Some(s) => parse_seconds(&s).filter(|d| !d.is_zero()).unwrap_or_else(|| {
            warn!("🪛️ {s} is not a valid number of seconds for {name}. Using the default, {}s, instead.", default.as_secs());
            default
        }),
        None => {
            debug!("🪛️ {name} is not set. Using the default value of {}s.", default.as_secs());
            default
        },
    }
}

fn max_attempts<F>(lookup: &F) -> u32
where F: Fn(&str) -> Option<String> {
    let attempts = whole_number(lookup, "RECON_CALLBACK_MAX_ATTEMPTS", DEFAULT_CALLBACK_MAX_ATTEMPTS, "attempts");
    u32::try_from(attempts).unwrap_or(u32::MAX)
}

fn whole_number<F>(lookup: &F, name: &str, default: i64, unit: &str) -> i64
where F: Fn(&str) -> Option<String> {
    match lookup(name).map(|s| (s.trim().parse::<i64>(), s)) {
        Some((Ok(v), _)) if v > 0 => v,
        Some((_, s)) => {
            warn!("🪛️ {s} is not a valid value for {name}. Using the default, {default} {unit}, instead.");
            default
        },
        None => {
            debug!("🪛️ {name} is not set. Using the default value of {default} {unit}.");
            default
        },
    }
}
