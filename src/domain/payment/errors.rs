use crate::event_sourcing::core::{AggregateError, SerializationError};
use crate::event_sourcing::store::EventStoreError;
use crate::utils::IsTransient;

use super::value_objects::PaymentStatus;

// ============================================================================
// Payment Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("undefined event type: {0}")]
    UndefinedReason(String),

    #[error("payment is already created")]
    AlreadyCreated,

    #[error("payment is not created")]
    NotCreated,

    #[error("payment must be confirmed before refunding")]
    NotConfirmed,

    #[error("cannot {action} a payment in status {status:?}")]
    InvalidStatusTransition {
        action: &'static str,
        status: PaymentStatus,
    },

    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    #[error("refund amount {refund} is greater than entire payment amount {amount}")]
    RefundExceedsAmount { refund: i64, amount: i64 },

    #[error(transparent)]
    Payload(#[from] SerializationError),
}

// ============================================================================
// Command Handler Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PaymentHandlerError {
    #[error("payment not found: {0}")]
    NotFound(String),

    #[error("command rejected: {0}")]
    Rejected(#[source] PaymentError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError<PaymentError>),

    #[error(transparent)]
    Store(#[from] EventStoreError),
}

impl IsTransient for PaymentHandlerError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_transient())
    }
}
