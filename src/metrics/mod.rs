// Private module declaration
mod server;

use std::sync::Arc;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Tracks every terminal outcome of the delivery pipeline plus the size of
// the in-memory retry ledger. The ledger gauge is the leak detector: entries
// that never reach a terminal state (because redelivery never arrives) show
// up as a gauge that climbs and never comes back down.
//
// Scraped via /metrics on the embedded HTTP server.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Delivery pipeline outcomes
    pub orders_processed: IntCounter,
    pub orders_retried: IntCounterVec,
    pub orders_dead_lettered: IntCounter,
    pub messages_dropped: IntCounter,

    // DLQ publish failures are silent drops, count them at least
    pub dlq_publish_failures: IntCounter,

    // Retry ledger leak detection
    pub retry_ledger_entries: IntGauge,

    // Per-message handling latency (includes backoff suspension)
    pub handling_duration: Histogram,

    // Producer side
    pub orders_produced: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_processed = IntCounter::new(
            "orders_processed_total",
            "Orders processed successfully",
        )?;
        registry.register(Box::new(orders_processed.clone()))?;

        let orders_retried = IntCounterVec::new(
            Opts::new("orders_retried_total", "Retry attempts scheduled"),
            &["attempt"],
        )?;
        registry.register(Box::new(orders_retried.clone()))?;

        let orders_dead_lettered = IntCounter::new(
            "orders_dead_lettered_total",
            "Orders routed to the dead-letter topic",
        )?;
        registry.register(Box::new(orders_dead_lettered.clone()))?;

        let messages_dropped = IntCounter::new(
            "messages_dropped_total",
            "Inbound messages dropped because the payload failed to decode",
        )?;
        registry.register(Box::new(messages_dropped.clone()))?;

        let dlq_publish_failures = IntCounter::new(
            "dlq_publish_failures_total",
            "Dead-letter publishes that failed and lost the record",
        )?;
        registry.register(Box::new(dlq_publish_failures.clone()))?;

        let retry_ledger_entries = IntGauge::new(
            "retry_ledger_entries",
            "Keys currently mid-retry in the in-memory ledger",
        )?;
        registry.register(Box::new(retry_ledger_entries.clone()))?;

        let handling_duration = Histogram::with_opts(
            HistogramOpts::new(
                "message_handling_duration_seconds",
                "Wall-clock time to handle one inbound message",
            )
            .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )?;
        registry.register(Box::new(handling_duration.clone()))?;

        let orders_produced = IntCounter::new(
            "orders_produced_total",
            "Orders synthesized and published",
        )?;
        registry.register(Box::new(orders_produced.clone()))?;

        Ok(Self {
            registry,
            orders_processed,
            orders_retried,
            orders_dead_lettered,
            messages_dropped,
            dlq_publish_failures,
            retry_ledger_entries,
            handling_duration,
            orders_produced,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Run the scrape server on a dedicated thread with its own runtime, so an
/// HTTP stall can never back-pressure the delivery pipeline.
pub fn spawn_metrics_server(registry: Arc<Registry>, service: &'static str, port: u16) {
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("Failed to build metrics runtime");
        rt.block_on(async {
            if let Err(e) = start_metrics_server(registry, service, port).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    });
}

// ============================================================================
// Unit Tests
// ============================================================================
