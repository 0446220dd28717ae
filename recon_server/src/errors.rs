use recon_engine::{traits::StoreError, NotifierError, OrderFlowError, SqliteDatabaseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("An error occurred in the database. {0}")]
    BackendError(String),
    #[error("The ledger source rejected our credentials. Polling has stopped. {0}")]
    LedgerAuthentication(String),
    #[error("{0}")]
    OrderFlowError(#[from] OrderFlowError),
    #[error("Callback delivery error. {0}")]
    NotifierError(#[from] NotifierError),
    #[error("Invalid input. {0}")]
    InvalidInput(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl From<SqliteDatabaseError> for ServerError {
    fn from(e: SqliteDatabaseError) -> Self {
        Self::BackendError(e.to_string())
    }
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        Self::BackendError(e.to_string())
    }
}
