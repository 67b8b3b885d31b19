// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each aggregate has its own subdirectory with:
// - Value objects
// - Events (reasons and payloads)
// - Commands
// - Errors
// - Aggregate state and its transition function
// - Command handler
//
// This layer only talks to the event sourcing infrastructure through
// `AggregateState`, `AggregateRoot` and the `EventStore` port.
//
// ============================================================================

pub mod payment;
