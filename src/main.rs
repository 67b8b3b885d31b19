use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use eventsourcing::config::AppConfig;
use eventsourcing::domain::payment::{PaymentCommand, PaymentCommandHandler};
use eventsourcing::event_sourcing::store::{EventStore, PostgresEventStore};
use eventsourcing::metrics::StoreMetrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,eventsourcing=debug"))
        )
        .init();

    tracing::info!("Starting event sourcing payment demo");

    let config = AppConfig::from_env()?;

    // === 1. Connect to Postgres ===
    tracing::info!(max_connections = config.max_connections, "Connecting to Postgres...");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    // === 2. Initialize Prometheus metrics ===
    let metrics = Arc::new(StoreMetrics::new()?);

    // === 3. Event store ===
    let store = PostgresEventStore::new(pool, config.events_table.clone())?.with_metrics(metrics.clone());
    store.migrate().await?;
    tracing::info!(table = %store.table(), "Event store ready");

    let store = Arc::new(store);
    let handler = PaymentCommandHandler::new(store.clone()).with_retry(config.retry.clone());

    // === 4. Demonstrate payment lifecycle ===
    let (payment_id, _) = handler.create(100).await?;
    tracing::info!(%payment_id, "Payment created");

    handler.handle(&payment_id, PaymentCommand::ConfirmPayment).await?;
    tracing::info!(%payment_id, "Payment confirmed");

    let version = handler
        .handle(&payment_id, PaymentCommand::RefundPayment { amount: 50 })
        .await?;
    tracing::info!(%payment_id, %version, "Payment partially refunded");

    let payment = handler.load(&payment_id).await?;
    tracing::info!(
        %payment_id,
        status = ?payment.state().status,
        available_amount = payment.state().available_amount,
        "Payment rebuilt from history"
    );

    let history = store.list(&payment_id, payment.aggregate_type(), None).await?;
    for event in &history {
        tracing::info!(
            version = %event.version(),
            reason = %event.reason(),
            timestamp = %event.timestamp(),
            "Stored event"
        );
    }

    tracing::info!(
        "Metrics registry holds {} metric families",
        metrics.registry().gather().len()
    );
    tracing::info!("Demo complete!");

    Ok(())
}
