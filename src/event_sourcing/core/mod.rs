// ============================================================================
// Event Sourcing Core - Events and the Aggregate State Machine
// ============================================================================
//
// Key Principles:
// - No domain-specific code (no Payment, Order, ...)
// - Domain state is supplied through the `AggregateState` capability
// - Serialization and identity generation are pluggable collaborators
//
// ============================================================================

pub mod aggregate;
pub mod event;
pub mod id_generator;
pub mod serializer;

// Re-export core types for convenience
pub use aggregate::{AggregateError, AggregateRoot, AggregateState};
pub use event::{Event, Payload, Version};
pub use id_generator::{AlphabetGenerator, IdGenerator, UuidGenerator, DEFAULT_ID_ALPHABET, DEFAULT_ID_SIZE};
pub use serializer::{
    BsonSerializer, JsonSerializer, SerializationError, Serializer, SerializerRegistry, BSON_SERIALIZER, JSON_SERIALIZER,
};
