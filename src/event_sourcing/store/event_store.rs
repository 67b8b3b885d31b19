use async_trait::async_trait;

use crate::event_sourcing::core::{Event, SerializationError, Version};

// ============================================================================
// Event Store Port
// ============================================================================
//
// Responsibilities:
// 1. Point lookup of one event by (aggregate id, aggregate type, version)
// 2. Ordered range reads of an aggregate's history
// 3. Atomic, optimistically concurrent appends
//
// The store never retries. A `ConcurrencyConflict` goes back to the caller,
// who reloads the aggregate and tries again.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    #[error("event not found: {aggregate_type}/{aggregate_id} version {version}")]
    NotFound {
        aggregate_id: String,
        aggregate_type: String,
        version: Version,
    },

    #[error("concurrency conflict on {aggregate_type}/{aggregate_id}: batch starts at version {attempted}, last persisted is {last_persisted}")]
    ConcurrencyConflict {
        aggregate_id: String,
        aggregate_type: String,
        attempted: Version,
        last_persisted: Version,
    },

    #[error("invalid event batch: {0}")]
    InvalidBatch(String),

    #[error("invalid table name: {0:?}")]
    InvalidTableName(String),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("backend error: {0}")]
    Backend(#[from] sqlx::Error),
}

impl EventStoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Bounds for [`EventStore::list`].
///
/// Passing no filter at all means the full history: no bounds, no paging. A
/// filter whose fields are all `None` behaves the same. `limit: Some(0)` asks
/// for zero rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Exclusive lower bound.
    pub after_version: Option<Version>,
    /// Exclusive upper bound.
    pub before_version: Option<Version>,
    pub limit: Option<u32>,
}

impl ListFilter {
    pub fn after(version: Version) -> Self {
        Self {
            after_version: Some(version),
            ..Self::default()
        }
    }

    pub fn before(version: Version) -> Self {
        Self {
            before_version: Some(version),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, version: Version) -> bool {
        self.after_version.map_or(true, |after| version > after)
            && self.before_version.map_or(true, |before| version < before)
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn get(&self, aggregate_id: &str, aggregate_type: &str, version: Version) -> Result<Event, EventStoreError>;

    /// Events of one aggregate ordered by version ascending.
    async fn list(
        &self,
        aggregate_id: &str,
        aggregate_type: &str,
        filter: Option<&ListFilter>,
    ) -> Result<Vec<Event>, EventStoreError>;

    /// Appends a batch of one aggregate's events, all or nothing.
    ///
    /// The first event must carry `last persisted version + 1`; otherwise the
    /// batch is refused with [`EventStoreError::ConcurrencyConflict`].
    async fn save(&self, events: &[Event]) -> Result<(), EventStoreError>;
}

/// Checks that a batch targets one aggregate with contiguous, non-dirty
/// versions. Returns the first event, or `None` for an empty batch.
pub(crate) fn validate_batch(events: &[Event]) -> Result<Option<&Event>, EventStoreError> {
    let Some(first) = events.first() else {
        return Ok(None);
    };

    if first.aggregate_id().is_empty() {
        return Err(EventStoreError::InvalidBatch("event has no aggregate id".to_string()));
    }
    if first.version().is_dirty() || first.version() == Version::EMPTY {
        return Err(EventStoreError::InvalidBatch(format!(
            "event version {} was never assigned by an aggregate",
            first.version()
        )));
    }

    let mut expected = first.version();
    for event in &events[1..] {
        if event.aggregate_id() != first.aggregate_id() || event.aggregate_type() != first.aggregate_type() {
            return Err(EventStoreError::InvalidBatch(format!(
                "batch mixes aggregates {}/{} and {}/{}",
                first.aggregate_type(),
                first.aggregate_id(),
                event.aggregate_type(),
                event.aggregate_id()
            )));
        }
        expected = expected.next();
        if event.version() != expected {
            return Err(EventStoreError::InvalidBatch(format!(
                "versions are not contiguous: expected {}, found {}",
                expected,
                event.version()
            )));
        }
    }

    Ok(Some(first))
}
