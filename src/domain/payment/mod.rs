// ============================================================================
// Payment Domain - Business Logic for the Payment Aggregate
// ============================================================================
//
// A payment is created with an amount, confirmed, and may be refunded up to
// the original amount.
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use command_handler::*;
