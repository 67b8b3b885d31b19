use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::event_sourcing::core::{Event, Version};
use crate::metrics::StoreMetrics;

use super::event_store::{validate_batch, EventStore, EventStoreError, ListFilter};

// ============================================================================
// In-Memory Event Store
// ============================================================================
//
// Runs the same optimistic concurrency check as the Postgres adapter, with
// the write lock standing in for the serializable transaction. Used by tests
// and local development.
//
// ============================================================================

type StreamKey = (String, String);

#[derive(Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamKey, Vec<Event>>>,
    metrics: Option<Arc<StoreMetrics>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(mut self, metrics: Arc<StoreMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Highest persisted version of an aggregate, `0` when it has no events.
    pub async fn last_version(&self, aggregate_id: &str, aggregate_type: &str) -> Version {
        let streams = self.streams.read().await;
        streams
            .get(&(aggregate_id.to_string(), aggregate_type.to_string()))
            .and_then(|events| events.last())
            .map(Event::version)
            .unwrap_or(Version::EMPTY)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn get(&self, aggregate_id: &str, aggregate_type: &str, version: Version) -> Result<Event, EventStoreError> {
        let streams = self.streams.read().await;
        streams
            .get(&(aggregate_id.to_string(), aggregate_type.to_string()))
            .and_then(|events| events.iter().find(|event| event.version() == version))
            .cloned()
            .ok_or_else(|| EventStoreError::NotFound {
                aggregate_id: aggregate_id.to_string(),
                aggregate_type: aggregate_type.to_string(),
                version,
            })
    }

    async fn list(
        &self,
        aggregate_id: &str,
        aggregate_type: &str,
        filter: Option<&ListFilter>,
    ) -> Result<Vec<Event>, EventStoreError> {
        let streams = self.streams.read().await;
        let Some(events) = streams.get(&(aggregate_id.to_string(), aggregate_type.to_string())) else {
            return Ok(Vec::new());
        };

        let Some(filter) = filter else {
            return Ok(events.clone());
        };

        let limit = filter.limit.map_or(usize::MAX, |limit| limit as usize);
        Ok(events
            .iter()
            .filter(|event| filter.matches(event.version()))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn save(&self, events: &[Event]) -> Result<(), EventStoreError> {
        let Some(first) = validate_batch(events)? else {
            return Ok(());
        };
        let started = Instant::now();

        let key = (first.aggregate_id().to_string(), first.aggregate_type().to_string());
        let mut streams = self.streams.write().await;

        let last_persisted = streams
            .get(&key)
            .and_then(|stream| stream.last())
            .map(Event::version)
            .unwrap_or(Version::EMPTY);
        if last_persisted.next() != first.version() {
            tracing::warn!(
                aggregate_id = %first.aggregate_id(),
                aggregate_type = %first.aggregate_type(),
                attempted = %first.version(),
                last_persisted = %last_persisted,
                "Optimistic concurrency conflict"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_conflict(first.aggregate_type());
            }
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id: first.aggregate_id().to_string(),
                aggregate_type: first.aggregate_type().to_string(),
                attempted: first.version(),
                last_persisted,
            });
        }

        let stream = streams.entry(key).or_default();
        stream.extend_from_slice(events);

        tracing::debug!(
            aggregate_id = %first.aggregate_id(),
            aggregate_type = %first.aggregate_type(),
            new_version = %stream.last().map(Event::version).unwrap_or(Version::EMPTY),
            event_count = events.len(),
            "Appended events to in-memory store"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_saved(first.aggregate_type(), events.len(), started.elapsed().as_secs_f64());
        }

        Ok(())
    }
}
