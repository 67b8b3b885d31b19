// ============================================================================
// Event Sourcing Store - Persistence Port and Adapters
// ============================================================================
//
// `EventStore` is the storage-agnostic port. Both adapters run the same
// optimistic concurrency check: the first event of a batch must carry
// `last persisted version + 1`, otherwise the whole batch is refused.
//
// ============================================================================

pub mod event_store;
pub mod in_memory;
pub mod postgres;

pub use event_store::{EventStore, EventStoreError, ListFilter};
pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
