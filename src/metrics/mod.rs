use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

// ============================================================================
// Metrics Module - Prometheus metrics for the event store
// ============================================================================
//
// Provides metrics for:
// - Events appended per aggregate type
// - Optimistic concurrency conflicts per aggregate type
// - Save latency
//
// Adapters take an optional `Arc<StoreMetrics>`; without one nothing is
// recorded.
// ============================================================================

pub struct StoreMetrics {
    registry: Registry,

    pub events_saved: IntCounterVec,
    pub save_conflicts: IntCounterVec,
    pub save_duration: HistogramVec,
}

impl StoreMetrics {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Registers the store metrics into an existing registry.
    pub fn with_registry(registry: Registry) -> anyhow::Result<Self> {
        let events_saved = IntCounterVec::new(
            Opts::new("es_events_saved_total", "Total events appended to the event store"),
            &["aggregate_type"],
        )?;
        registry.register(Box::new(events_saved.clone()))?;

        let save_conflicts = IntCounterVec::new(
            Opts::new("es_save_conflicts_total", "Saves refused by optimistic concurrency control"),
            &["aggregate_type"],
        )?;
        registry.register(Box::new(save_conflicts.clone()))?;

        let save_duration = HistogramVec::new(
            HistogramOpts::new("es_save_duration_seconds", "Event store save duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["aggregate_type"],
        )?;
        registry.register(Box::new(save_duration.clone()))?;

        Ok(Self {
            registry,
            events_saved,
            save_conflicts,
            save_duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_saved(&self, aggregate_type: &str, event_count: usize, duration_secs: f64) {
        self.events_saved
            .with_label_values(&[aggregate_type])
            .inc_by(event_count as u64);
        self.save_duration.with_label_values(&[aggregate_type]).observe(duration_secs);
    }

    pub fn record_conflict(&self, aggregate_type: &str) {
        self.save_conflicts.with_label_values(&[aggregate_type]).inc();
    }
}
