use thiserror::Error;

use crate::{
    db::traits::StoreError,
    db_types::{EntryId, OrderId},
};

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database connection error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Could not run database migrations: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("Cannot process duplicate order {0}")]
    DuplicateOrder(OrderId),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Ledger entry {0} does not exist")]
    EntryNotFound(EntryId),
    #[error("Illegal order status transition. {0}")]
    IllegalTransition(String),
}

impl From<SqliteDatabaseError> for StoreError {
    fn from(e: SqliteDatabaseError) -> Self {
        match e {
            SqliteDatabaseError::DuplicateOrder(id) => StoreError::DuplicateOrder(id),
            SqliteDatabaseError::OrderNotFound(id) => StoreError::OrderNotFound(id),
            SqliteDatabaseError::EntryNotFound(id) => StoreError::EntryNotFound(id),
            SqliteDatabaseError::IllegalTransition(s) => StoreError::IllegalTransition(s),
            e => StoreError::DatabaseError(e.to_string()),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}
