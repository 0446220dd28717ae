//! Ledger Reconciliation Engine
//!
//! The engine watches an exchange account ledger for incoming transfers and reconciles them against payment orders
//! created by an external business system. When a transfer pays for an order, the business system is told about it
//! with a signed callback.
//!
//! The library is divided into these sections:
//! 1. Storage ([`mod@db`]). The storage traits define the compare-and-set contracts that make concurrent matching
//!    safe; SQLite is the supported backend. The data types stored by the engine live in [`db_types`].
//! 2. Ledger intake ([`ledger`]). A [`ledger::LedgerSource`] supplies raw ledger records; the [`LedgerPoller`] and
//!    [`Reconciler`] turn them into stored entries and matches.
//! 3. The public API objects: [`OrderFlowApi`] for order intake, status and cancellation, the [`Matcher`] and the
//!    [`ExpirySweeper`].
//! 4. Callback delivery ([`notifier`]), including the signing and verification helpers that recipients can use.
//!
//! The engine also publishes events when orders are matched or annulled. Hooks registered through
//! [`events::EventHooks`] receive them; this is how match callbacks are triggered.
mod api;
mod db;

pub mod db_types;
pub mod events;
pub mod ledger;
pub mod notifier;

pub use api::{
    errors::OrderFlowError,
    expiry::ExpirySweeper,
    matcher::{MatchResult, Matcher},
    order_flow_api::{OrderFlowApi, DEFAULT_ORDER_WINDOW_MINUTES},
    order_objects,
};
#[cfg(feature = "sqlite")]
pub use db::sqlite::{SqliteDatabase, SqliteDatabaseError};
pub use db::traits;
pub use ledger::{CycleReport, LedgerPoller, PollError, Reconciler};
pub use notifier::{DeliveryOutcome, Notifier, NotifierError, RetryPolicy};
