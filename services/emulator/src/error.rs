use emu_errors::AppError;
use thiserror::Error;
use tonic::Status;

#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(i64),
    #[error("Limit price must be positive")]
    InvalidPrice,
    #[error("Depth must be positive, got {0}")]
    InvalidDepth(i32),
    #[error("Instrument not found: {0}")]
    InstrumentNotFound(String),
    #[error("Order not found: {0}")]
    OrderNotFound(String),
    #[error("Invalid order id: {0}")]
    InvalidOrderId(String),
    #[error("Order {order_id} does not belong to account {account_id}")]
    OrderOwnership { order_id: String, account_id: String },
    #[error("Order already exists: {0}")]
    DuplicateOrder(String),
    #[error("{0}")]
    Validation(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EmulatorError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<EmulatorError> for AppError {
    fn from(error: EmulatorError) -> Self {
        let message = error.to_string();
        match error {
            EmulatorError::InvalidQuantity(_)
            | EmulatorError::InvalidPrice
            | EmulatorError::InvalidDepth(_)
            | EmulatorError::InvalidOrderId(_)
            | EmulatorError::Validation(_) => AppError::Validation(message),
            EmulatorError::InstrumentNotFound(_) | EmulatorError::OrderNotFound(_) => {
                AppError::NotFound(message)
            }
            EmulatorError::OrderOwnership { .. } => AppError::PermissionDenied(message),
            EmulatorError::DuplicateOrder(_) => AppError::Conflict(message),
            EmulatorError::Internal(_) => AppError::Internal(message),
        }
    }
}

impl From<EmulatorError> for Status {
    fn from(error: EmulatorError) -> Self {
        AppError::from(error).into()
    }
}

pub type EmulatorResult<T> = Result<T, EmulatorError>;
