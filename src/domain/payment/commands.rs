// ============================================================================
// Payment Commands - Represent user intent
// ============================================================================

#[derive(Debug, Clone)]
pub enum PaymentCommand {
    CreatePayment {
        payment_id: String,
        amount: i64,
    },
    ConfirmPayment,
    RefundPayment {
        amount: i64,
    },
}
