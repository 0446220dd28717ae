//! # Reconciliation engine public API
//!
//! The `api` module exposes the programmatic API for the reconciliation engine. Each API object is created by
//! supplying a database backend that implements the storage traits it needs, so that callers can pick the pieces
//! they want to run.
//!
//! * [`order_flow_api`] handles order intake, status queries and cancellation on behalf of the business system.
//! * [`matcher`] decides which pending order a ledger entry pays for and commits the link.
//! * [`expiry`] closes pending orders whose deadline has passed.
//!
//! ```rust,ignore
//! use recon_engine::{OrderFlowApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/recon_store.db", 5).await?;
//! let api = OrderFlowApi::new(db, EventProducers::default());
//! let report = api.order_status(&"ORDER123456".into()).await?;
//! ```
pub mod errors;
pub mod expiry;
pub mod matcher;
pub mod order_flow_api;
pub mod order_objects;
