use std::sync::Arc;

use crate::event_sourcing::core::{
    AggregateRoot, AggregateState, IdGenerator, UuidGenerator, Version, DEFAULT_ID_ALPHABET, DEFAULT_ID_SIZE,
};
use crate::event_sourcing::store::EventStore;
use crate::utils::{retry_on_transient, RetryConfig};

use super::aggregate::PaymentState;
use super::commands::PaymentCommand;
use super::errors::PaymentHandlerError;

// ============================================================================
// Payment Command Handler
// ============================================================================
//
// Orchestrates: Load -> Command -> Events -> Aggregate -> Event Store
//
// Each attempt reloads the aggregate, so a save refused by optimistic
// concurrency control is retried against the winner's history.
//
// ============================================================================

pub type PaymentAggregate = AggregateRoot<PaymentState>;

pub struct PaymentCommandHandler<S: EventStore> {
    event_store: Arc<S>,
    retry: RetryConfig,
    id_generator: Arc<dyn IdGenerator>,
}

impl<S: EventStore> PaymentCommandHandler<S> {
    pub fn new(event_store: Arc<S>) -> Self {
        Self {
            event_store,
            retry: RetryConfig::default(),
            id_generator: Arc::new(UuidGenerator),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }

    /// Creates a new payment under a freshly minted id.
    ///
    /// Returns the aggregate id together with the persisted version.
    pub async fn create(&self, amount: i64) -> Result<(String, Version), PaymentHandlerError> {
        let aggregate_id = self.id_generator.generate(DEFAULT_ID_ALPHABET, DEFAULT_ID_SIZE);
        let command = PaymentCommand::CreatePayment {
            payment_id: aggregate_id.clone(),
            amount,
        };
        let version = self.handle(&aggregate_id, command).await?;
        Ok((aggregate_id, version))
    }

    /// Handle a command and persist resulting events
    pub async fn handle(&self, aggregate_id: &str, command: PaymentCommand) -> Result<Version, PaymentHandlerError> {
        let command = &command;
        retry_on_transient(self.retry.clone(), move |attempt| self.execute(aggregate_id, command, attempt))
            .await
            .into_result()
    }

    /// Loads a payment from its persisted history.
    pub async fn load(&self, aggregate_id: &str) -> Result<PaymentAggregate, PaymentHandlerError> {
        let history = self.event_store.list(aggregate_id, PaymentState::AGGREGATE_TYPE, None).await?;
        if history.is_empty() {
            return Err(PaymentHandlerError::NotFound(aggregate_id.to_string()));
        }
        Ok(AggregateRoot::rehydrate(PaymentState::default(), history)?)
    }

    async fn execute(
        &self,
        aggregate_id: &str,
        command: &PaymentCommand,
        attempt: u32,
    ) -> Result<Version, PaymentHandlerError> {
        let mut aggregate = match self.load(aggregate_id).await {
            Ok(aggregate) => aggregate,
            Err(PaymentHandlerError::NotFound(_)) if matches!(command, PaymentCommand::CreatePayment { .. }) => {
                AggregateRoot::with_id(PaymentState::default(), aggregate_id)
            }
            Err(e) => return Err(e),
        };

        let events = aggregate
            .state()
            .handle_command(command)
            .map_err(PaymentHandlerError::Rejected)?;
        for event in events {
            aggregate.apply(event)?;
        }

        let pending = aggregate.list_uncommitted_events();
        self.event_store.save(&pending).await?;
        aggregate.commit_all(&pending);

        tracing::debug!(
            aggregate_id = %aggregate.id(),
            version = %aggregate.version(),
            attempt = attempt,
            event_count = pending.len(),
            "Handled payment command"
        );

        Ok(aggregate.version())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::errors::PaymentError;
    use crate::domain::payment::events::{PaymentRefunded, PAYMENT_REFUNDED};
    use crate::domain::payment::value_objects::PaymentStatus;
    use crate::event_sourcing::core::Event;
    use crate::event_sourcing::store::{EventStoreError, InMemoryEventStore, ListFilter};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    /// Lets a rival writer slip a refund in ahead of the next save once armed.
    #[derive(Default)]
    struct ContendedStore {
        inner: InMemoryEventStore,
        armed: AtomicBool,
    }

    #[async_trait]
    impl EventStore for ContendedStore {
        async fn get(&self, aggregate_id: &str, aggregate_type: &str, version: Version) -> Result<Event, EventStoreError> {
            self.inner.get(aggregate_id, aggregate_type, version).await
        }

        async fn list(
            &self,
            aggregate_id: &str,
            aggregate_type: &str,
            filter: Option<&ListFilter>,
        ) -> Result<Vec<Event>, EventStoreError> {
            self.inner.list(aggregate_id, aggregate_type, filter).await
        }

        async fn save(&self, events: &[Event]) -> Result<(), EventStoreError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                if let Some(first) = events.first() {
                    let mut rival = Event::new(PAYMENT_REFUNDED, &PaymentRefunded { refund_amount: 10 })?;
                    rival.set_aggregate_id(first.aggregate_id());
                    rival.set_aggregate_type(first.aggregate_type());
                    rival.set_version(first.version());
                    self.inner.save(&[rival]).await?;
                }
            }
            self.inner.save(events).await
        }
    }

    #[tokio::test]
    async fn test_payment_lifecycle() {
        let handler = PaymentCommandHandler::new(Arc::new(InMemoryEventStore::new()));

        let (id, version) = handler.create(100).await.unwrap();
        assert_eq!(version, Version::new(1));

        assert_eq!(handler.handle(&id, PaymentCommand::ConfirmPayment).await.unwrap(), Version::new(2));
        assert_eq!(
            handler.handle(&id, PaymentCommand::RefundPayment { amount: 50 }).await.unwrap(),
            Version::new(3)
        );

        let payment = handler.load(&id).await.unwrap();
        assert_eq!(payment.id(), id);
        assert_eq!(payment.state().payment_id, id);
        assert_eq!(payment.state().status, PaymentStatus::Refunded);
        assert_eq!(payment.state().available_amount, 50);
        assert_eq!(payment.list_committed_events().len(), 3);
        assert!(!payment.has_uncommitted_events());
    }

    #[tokio::test]
    async fn test_minted_ids_come_from_generator() {
        let handler = PaymentCommandHandler::new(Arc::new(InMemoryEventStore::new()))
            .with_id_generator(Arc::new(|_: &str, _: usize| "fixed-id".to_string()));

        let (id, _) = handler.create(10).await.unwrap();
        assert_eq!(id, "fixed-id");

        let again = handler.create(10).await;
        assert!(matches!(again, Err(PaymentHandlerError::Rejected(PaymentError::AlreadyCreated))));
    }

    #[tokio::test]
    async fn test_unknown_payment() {
        let handler = PaymentCommandHandler::new(Arc::new(InMemoryEventStore::new()));

        let result = handler.handle("missing", PaymentCommand::ConfirmPayment).await;
        assert!(matches!(result, Err(PaymentHandlerError::NotFound(ref id)) if id == "missing"));
        assert!(matches!(handler.load("missing").await, Err(PaymentHandlerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rejected_command_persists_nothing() {
        let store = Arc::new(InMemoryEventStore::new());
        let handler = PaymentCommandHandler::new(store.clone());
        let (id, _) = handler.create(100).await.unwrap();

        let result = handler.handle(&id, PaymentCommand::RefundPayment { amount: 10 }).await;
        assert!(matches!(result, Err(PaymentHandlerError::Rejected(PaymentError::NotConfirmed))));
        assert_eq!(store.last_version(&id, PaymentState::AGGREGATE_TYPE).await, Version::new(1));
    }

    #[tokio::test]
    async fn test_conflict_is_retried_on_fresh_state() {
        let store = Arc::new(ContendedStore::default());
        let handler = PaymentCommandHandler::new(store.clone()).with_retry(fast_retry(3));

        let (id, _) = handler.create(100).await.unwrap();
        handler.handle(&id, PaymentCommand::ConfirmPayment).await.unwrap();

        store.armed.store(true, Ordering::SeqCst);
        let version = handler.handle(&id, PaymentCommand::RefundPayment { amount: 30 }).await.unwrap();
        assert_eq!(version, Version::new(4));

        let payment = handler.load(&id).await.unwrap();
        assert_eq!(payment.state().refund_amount, 40);
        assert_eq!(payment.state().available_amount, 60);
    }

    #[tokio::test]
    async fn test_conflict_surfaces_without_retry() {
        let store = Arc::new(ContendedStore::default());
        let handler = PaymentCommandHandler::new(store.clone()).with_retry(RetryConfig::no_retry());

        let (id, _) = handler.create(100).await.unwrap();
        handler.handle(&id, PaymentCommand::ConfirmPayment).await.unwrap();

        store.armed.store(true, Ordering::SeqCst);
        let result = handler.handle(&id, PaymentCommand::RefundPayment { amount: 30 }).await;
        assert!(matches!(
            result,
            Err(PaymentHandlerError::Store(EventStoreError::ConcurrencyConflict { .. }))
        ));
    }
}
