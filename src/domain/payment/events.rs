use serde::{Deserialize, Serialize};

use super::value_objects::PaymentStatus;

// ============================================================================
// Payment Events - Reasons and Payloads
// ============================================================================
//
// The reason string is what `transition` switches on; the payload structs are
// what the event body decodes into.
//
// ============================================================================

pub const PAYMENT_CREATED: &str = "created";
pub const PAYMENT_CONFIRMED: &str = "confirmed";
pub const PAYMENT_REFUNDED: &str = "refunded";

/// Payment Created - initial event in the payment lifecycle
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PaymentCreated {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub amount: i64,
    pub available_amount: i64,
}

/// Payment Confirmed - funds captured
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PaymentConfirmed {
    pub status: PaymentStatus,
}

/// Payment Refunded - part or all of the amount returned
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PaymentRefunded {
    pub refund_amount: i64,
}
