use thiserror::Error;

use crate::{
    db::traits::StoreError,
    db_types::{OrderId, OrderStatusType},
};

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Database error: {0}")]
    DatabaseError(StoreError),
    #[error("Invalid order: {0}")]
    InvalidOrder(String),
    #[error("Order {0} already exists")]
    OrderAlreadyExists(OrderId),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {0} cannot be cancelled because it is {1}")]
    CannotCancel(OrderId, OrderStatusType),
}

/// Store conflicts surface as the API's own variants.
impl From<StoreError> for OrderFlowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateOrder(id) => OrderFlowError::OrderAlreadyExists(id),
            StoreError::OrderNotFound(id) => OrderFlowError::OrderNotFound(id),
            e => OrderFlowError::DatabaseError(e),
        }
    }
}
