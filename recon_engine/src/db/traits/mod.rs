//! #  Storage contracts
//!
//! This module defines the interface contracts that storage *backends* must fulfil to host the reconciliation engine.
//!
//! * [`TransferStore`] is the durable record of every observed ledger entry, keyed uniquely by the exchange's entry
//!   identifier. Inserting an identifier a second time is a no-op that reports [`InsertEntryResult::AlreadyExists`].
//! * [`OrderStore`] is the durable record of payment orders, keyed uniquely by the caller's order id. Status changes
//!   are compare-and-set operations guarded by the expected prior status.
//! * [`ReconciliationDatabase`] ties the two together and adds [`ReconciliationDatabase::commit_match`], which links
//!   one entry to one order in a single atomic unit.
//!
//! Concurrent matchers, possibly in different processes, rely entirely on these compare-and-set guarantees. Backends
//! must not implement them as read-then-write sequences outside a transaction.
mod data_objects;
mod order_store;
mod reconciliation_database;
mod transfer_store;

pub use data_objects::{CandidateQuery, InsertEntryResult, MatchCommit};
pub use order_store::OrderStore;
pub use reconciliation_database::{ReconciliationDatabase, StoreError};
pub use transfer_store::TransferStore;
