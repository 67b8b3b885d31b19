use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, QueryBuilder, Row, Transaction};

use crate::event_sourcing::core::{Event, Payload, Version};
use crate::metrics::StoreMetrics;

use super::event_store::{validate_batch, EventStore, EventStoreError, ListFilter};

// ============================================================================
// PostgreSQL Event Store - Optimistic Concurrency Control
// ============================================================================
//
// Save runs one SERIALIZABLE transaction:
//
//   begin -> read highest version -> verify first.version == last + 1
//         -> insert every event -> commit
//
// Any failure rolls the whole batch back. The unique index on
// (aggregate_id, aggregate_type, version) is the backstop for races the
// version check cannot see; a violation of it, or a serialization failure,
// is reported as a concurrency conflict just like a failed version check.
//
// ============================================================================

const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";

const COLUMNS: &str = "aggregate_id, aggregate_type, reason, version, tstamp, payload, serializer";

#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
    table: String,
    metrics: Option<Arc<StoreMetrics>>,
}

impl PostgresEventStore {
    /// `table` may be schema-qualified (`public.es_events`) and is checked to
    /// be a plain identifier because it is spliced into SQL text.
    pub fn new(pool: PgPool, table: impl Into<String>) -> Result<Self, EventStoreError> {
        let table = table.into();
        if !is_valid_table_name(&table) {
            return Err(EventStoreError::InvalidTableName(table));
        }
        Ok(Self {
            pool,
            table,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<StoreMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creates the events table and its indexes. Safe to run repeatedly.
    pub async fn migrate(&self) -> Result<(), EventStoreError> {
        let index_prefix = self.table.replace('.', "_");
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    aggregate_id   VARCHAR(128) NOT NULL,
                    aggregate_type VARCHAR(128) NOT NULL,
                    reason         TEXT NOT NULL,
                    version        BIGINT NOT NULL,
                    tstamp         TIMESTAMPTZ NOT NULL,
                    payload        BYTEA,
                    serializer     VARCHAR(16)
                )",
                self.table
            ),
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {}_id_type_version_un ON {} (aggregate_id, aggregate_type, version)",
                index_prefix, self.table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {}_id_type_idx ON {} (aggregate_id, aggregate_type)",
                index_prefix, self.table
            ),
        ];

        let mut tx = self.pool.begin().await?;
        for statement in &statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        tracing::info!(table = %self.table, "Event store schema migrated");
        Ok(())
    }

    /// Highest persisted version of an aggregate, `0` when it has no events.
    pub async fn last_version(&self, aggregate_id: &str, aggregate_type: &str) -> Result<Version, EventStoreError> {
        let mut conn = self.pool.acquire().await?;
        let sql = self.last_version_sql();
        let last: Option<i64> = sqlx::query_scalar(&sql)
            .bind(aggregate_id)
            .bind(aggregate_type)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(last.map(Version::new).unwrap_or(Version::EMPTY))
    }

    fn last_version_sql(&self) -> String {
        format!(
            "SELECT version FROM {} WHERE aggregate_id = $1 AND aggregate_type = $2 ORDER BY version DESC LIMIT 1",
            self.table
        )
    }

    async fn control_concurrency(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        first: &Event,
    ) -> Result<(), EventStoreError> {
        let sql = self.last_version_sql();
        let last: Option<i64> = sqlx::query_scalar(&sql)
            .bind(first.aggregate_id())
            .bind(first.aggregate_type())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| classify_write_error(e, first))?;
        let last_persisted = last.map(Version::new).unwrap_or(Version::EMPTY);

        if last_persisted.next() != first.version() {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id: first.aggregate_id().to_string(),
                aggregate_type: first.aggregate_type().to_string(),
                attempted: first.version(),
                last_persisted,
            });
        }
        Ok(())
    }

    async fn insert_all(&self, tx: &mut Transaction<'_, Postgres>, events: &[Event]) -> Result<(), EventStoreError> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            self.table, COLUMNS
        );
        for event in events {
            sqlx::query(&sql)
                .bind(event.aggregate_id())
                .bind(event.aggregate_type())
                .bind(event.reason())
                .bind(event.version().get())
                .bind(event.timestamp())
                .bind(event.payload().as_bytes())
                .bind(event.serializer())
                .execute(&mut **tx)
                .await
                .map_err(|e| classify_write_error(e, event))?;
        }
        Ok(())
    }

    async fn save_in_transaction(&self, events: &[Event], first: &Event) -> Result<(), EventStoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let outcome = match self.control_concurrency(&mut tx, first).await {
            Ok(()) => self.insert_all(&mut tx, events).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => tx
                .commit()
                .await
                .map_err(|e| classify_write_error(e, first)),
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    tracing::error!(error = %rollback_error, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn get(&self, aggregate_id: &str, aggregate_type: &str, version: Version) -> Result<Event, EventStoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE aggregate_id = $1 AND aggregate_type = $2 AND version = $3",
            COLUMNS, self.table
        );
        let row = sqlx::query(&sql)
            .bind(aggregate_id)
            .bind(aggregate_type)
            .bind(version.get())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => event_from_row(&row),
            None => Err(EventStoreError::NotFound {
                aggregate_id: aggregate_id.to_string(),
                aggregate_type: aggregate_type.to_string(),
                version,
            }),
        }
    }

    async fn list(
        &self,
        aggregate_id: &str,
        aggregate_type: &str,
        filter: Option<&ListFilter>,
    ) -> Result<Vec<Event>, EventStoreError> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
        query.push(COLUMNS).push(" FROM ").push(&self.table);
        query.push(" WHERE aggregate_id = ").push_bind(aggregate_id);
        query.push(" AND aggregate_type = ").push_bind(aggregate_type);

        if let Some(filter) = filter {
            if let Some(after) = filter.after_version {
                query.push(" AND version > ").push_bind(after.get());
            }
            if let Some(before) = filter.before_version {
                query.push(" AND version < ").push_bind(before.get());
            }
        }
        query.push(" ORDER BY version ASC");
        if let Some(limit) = filter.and_then(|filter| filter.limit) {
            query.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = query.build().fetch_all(&self.pool).await?;
        let events = rows.iter().map(event_from_row).collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            aggregate_id = %aggregate_id,
            aggregate_type = %aggregate_type,
            event_count = events.len(),
            "Listed events"
        );
        Ok(events)
    }

    async fn save(&self, events: &[Event]) -> Result<(), EventStoreError> {
        let Some(first) = validate_batch(events)? else {
            return Ok(());
        };
        let started = Instant::now();

        match self.save_in_transaction(events, first).await {
            Ok(()) => {
                tracing::info!(
                    aggregate_id = %first.aggregate_id(),
                    aggregate_type = %first.aggregate_type(),
                    first_version = %first.version(),
                    event_count = events.len(),
                    "Appended events to event store"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_saved(first.aggregate_type(), events.len(), started.elapsed().as_secs_f64());
                }
                Ok(())
            }
            Err(e) => {
                if e.is_conflict() {
                    tracing::warn!(
                        aggregate_id = %first.aggregate_id(),
                        aggregate_type = %first.aggregate_type(),
                        error = %e,
                        "Optimistic concurrency conflict, batch rolled back"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_conflict(first.aggregate_type());
                    }
                } else {
                    tracing::error!(
                        aggregate_id = %first.aggregate_id(),
                        aggregate_type = %first.aggregate_type(),
                        error = %e,
                        "Event batch rolled back"
                    );
                }
                Err(e)
            }
        }
    }
}

fn event_from_row(row: &PgRow) -> Result<Event, EventStoreError> {
    let payload: Option<Vec<u8>> = row.try_get("payload")?;
    let serializer: Option<String> = row.try_get("serializer")?;
    let timestamp: DateTime<Utc> = row.try_get("tstamp")?;
    let version: i64 = row.try_get("version")?;
    let aggregate_id: String = row.try_get("aggregate_id")?;
    let aggregate_type: String = row.try_get("aggregate_type")?;
    let reason: String = row.try_get("reason")?;

    Ok(Event::from_parts(
        aggregate_id,
        aggregate_type,
        reason,
        Version::new(version),
        timestamp,
        Payload::from(payload.unwrap_or_default()),
        serializer.unwrap_or_else(|| crate::event_sourcing::core::JSON_SERIALIZER.to_string()),
    ))
}

/// Maps constraint and serialization failures onto `ConcurrencyConflict`.
fn classify_write_error(error: sqlx::Error, event: &Event) -> EventStoreError {
    let conflict = match &error {
        sqlx::Error::Database(db_error) => matches!(
            db_error.code().as_deref(),
            Some(UNIQUE_VIOLATION) | Some(SERIALIZATION_FAILURE)
        ),
        _ => false,
    };

    if conflict {
        tracing::debug!(error = %error, "Write failed on a concurrency guard");
        EventStoreError::ConcurrencyConflict {
            aggregate_id: event.aggregate_id().to_string(),
            aggregate_type: event.aggregate_type().to_string(),
            attempted: event.version(),
            // the competing writer's version is not observable from here
            last_persisted: event.version(),
        }
    } else {
        EventStoreError::Backend(error)
    }
}

fn is_valid_table_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_validation() {
        assert!(is_valid_table_name("es_events"));
        assert!(is_valid_table_name("public.es_events"));
        assert!(is_valid_table_name("_events2"));

        assert!(!is_valid_table_name(""));
        assert!(!is_valid_table_name("2events"));
        assert!(!is_valid_table_name("es_events; DROP TABLE users"));
        assert!(!is_valid_table_name("a.b.c"));
        assert!(!is_valid_table_name("public."));
    }

    #[tokio::test]
    async fn test_new_rejects_bad_table_name() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let result = PostgresEventStore::new(pool.clone(), "events--");
        assert!(matches!(result, Err(EventStoreError::InvalidTableName(_))));

        let store = PostgresEventStore::new(pool, "public.es_events").unwrap();
        assert_eq!(store.table(), "public.es_events");
    }

    #[derive(Debug)]
    struct SqlState {
        code: &'static str,
    }

    impl std::fmt::Display for SqlState {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "sqlstate {}", self.code)
        }
    }

    impl std::error::Error for SqlState {}

    impl sqlx::error::DatabaseError for SqlState {
        fn message(&self) -> &str {
            self.code
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(std::borrow::Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            match self.code {
                UNIQUE_VIOLATION => sqlx::error::ErrorKind::UniqueViolation,
                "23502" => sqlx::error::ErrorKind::NotNullViolation,
                _ => sqlx::error::ErrorKind::Other,
            }
        }
    }

    fn database_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(SqlState { code }))
    }

    fn stamped(version: i64) -> Event {
        let mut event = Event::new("refunded", &()).unwrap();
        event.set_aggregate_id("a");
        event.set_aggregate_type("Payment");
        event.set_version(Version::new(version));
        event
    }

    #[test]
    fn test_unique_violation_is_a_conflict() {
        let error = database_error(UNIQUE_VIOLATION);
        match classify_write_error(error, &stamped(4)) {
            EventStoreError::ConcurrencyConflict { aggregate_id, aggregate_type, attempted, .. } => {
                assert_eq!(aggregate_id, "a");
                assert_eq!(aggregate_type, "Payment");
                assert_eq!(attempted, Version::new(4));
            }
            other => panic!("expected ConcurrencyConflict, got {:?}", other),
        }
    }

    #[test]
    fn test_serialization_failure_is_a_conflict() {
        let error = database_error(SERIALIZATION_FAILURE);
        assert!(classify_write_error(error, &stamped(2)).is_conflict());
    }

    #[test]
    fn test_other_database_errors_are_backend_errors() {
        // not_null_violation
        let error = database_error("23502");
        let classified = classify_write_error(error, &stamped(2));
        assert!(!classified.is_conflict());
        assert!(matches!(classified, EventStoreError::Backend(sqlx::Error::Database(_))));
    }

    #[test]
    fn test_non_database_errors_are_backend_errors() {
        let event = Event::new("created", &()).unwrap();
        let classified = classify_write_error(sqlx::Error::PoolTimedOut, &event);
        assert!(matches!(classified, EventStoreError::Backend(sqlx::Error::PoolTimedOut)));
    }
}
