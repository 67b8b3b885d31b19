use crate::event_sourcing::core::{AggregateState, Event};

use super::commands::PaymentCommand;
use super::errors::PaymentError;
use super::events::*;
use super::value_objects::PaymentStatus;

// ============================================================================
// Payment Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentState {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub amount: i64,
    pub available_amount: i64,
    pub refund_amount: i64,
}

impl PaymentState {
    /// Validate a command against current state and emit the events it causes.
    pub fn handle_command(&self, command: &PaymentCommand) -> Result<Vec<Event>, PaymentError> {
        match command {
            PaymentCommand::CreatePayment { payment_id, amount } => {
                if self.status != PaymentStatus::Pending {
                    return Err(PaymentError::AlreadyCreated);
                }
                if *amount <= 0 {
                    return Err(PaymentError::InvalidAmount(*amount));
                }

                Ok(vec![Event::new(
                    PAYMENT_CREATED,
                    &PaymentCreated {
                        payment_id: payment_id.clone(),
                        status: PaymentStatus::Created,
                        amount: *amount,
                        available_amount: *amount,
                    },
                )?])
            }

            PaymentCommand::ConfirmPayment => {
                match self.status {
                    PaymentStatus::Created => {}
                    PaymentStatus::Pending => return Err(PaymentError::NotCreated),
                    status => {
                        return Err(PaymentError::InvalidStatusTransition { action: "confirm", status })
                    }
                }

                Ok(vec![Event::new(
                    PAYMENT_CONFIRMED,
                    &PaymentConfirmed {
                        status: PaymentStatus::Confirmed,
                    },
                )?])
            }

            PaymentCommand::RefundPayment { amount } => {
                match self.status {
                    PaymentStatus::Confirmed | PaymentStatus::Refunded => {}
                    PaymentStatus::Pending => return Err(PaymentError::NotCreated),
                    PaymentStatus::Created => return Err(PaymentError::NotConfirmed),
                }
                if *amount <= 0 {
                    return Err(PaymentError::InvalidAmount(*amount));
                }
                let refund = self.refund_amount + amount;
                if refund > self.amount {
                    return Err(PaymentError::RefundExceedsAmount {
                        refund,
                        amount: self.amount,
                    });
                }

                Ok(vec![Event::new(
                    PAYMENT_REFUNDED,
                    &PaymentRefunded { refund_amount: refund },
                )?])
            }
        }
    }

    fn on_created(&mut self, payload: PaymentCreated) {
        self.payment_id = payload.payment_id;
        self.status = payload.status;
        self.amount = payload.amount;
        self.available_amount = payload.available_amount;
    }

    fn on_confirmed(&mut self, payload: PaymentConfirmed) {
        self.status = payload.status;
    }

    fn on_refunded(&mut self, payload: PaymentRefunded) -> Result<(), PaymentError> {
        if payload.refund_amount > self.amount {
            return Err(PaymentError::RefundExceedsAmount {
                refund: payload.refund_amount,
                amount: self.amount,
            });
        }
        self.refund_amount = payload.refund_amount;
        self.available_amount = self.amount - payload.refund_amount;
        self.status = PaymentStatus::Refunded;
        Ok(())
    }
}

impl AggregateState for PaymentState {
    const AGGREGATE_TYPE: &'static str = "PaymentAggregate";
    type Error = PaymentError;

    fn transition(&mut self, event: &Event) -> Result<(), Self::Error> {
        match event.reason() {
            PAYMENT_CREATED => {
                self.on_created(event.decode()?);
                Ok(())
            }
            PAYMENT_CONFIRMED => {
                self.on_confirmed(event.decode()?);
                Ok(())
            }
            PAYMENT_REFUNDED => self.on_refunded(event.decode()?),
            other => Err(PaymentError::UndefinedReason(other.to_string())),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
