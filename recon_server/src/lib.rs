//! # Reconciliation server
//! This crate hosts the daemon and operator tooling for the reconciliation engine. The daemon:
//! * polls the exchange ledger export on a fixed interval and stores entries it has not seen,
//! * matches new entries against open payment orders,
//! * delivers signed callbacks for every match, and sweeps up deliveries that were missed,
//! * expires orders whose payment window has passed.
//!
//! The same binary offers commands to create, inspect and cancel orders, to redeliver callbacks and to verify a
//! callback signature.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
pub mod cli;
pub mod config;
pub mod errors;
pub mod server;
pub mod sources;
pub mod workers;
