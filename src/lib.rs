// ============================================================================
// order-stream
// ============================================================================
//
// Producer/consumer pair around a Kafka "orders" topic carrying Avro-encoded
// order records, with an at-least-once retry-then-dead-letter pipeline on
// the consumer side. Retry state is a per-key in-memory ledger: it resets on
// restart, so a redelivery after a restart starts as a fresh attempt.
//
// ============================================================================

pub mod codec;
pub mod config;
pub mod dlq;
pub mod ledger;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod producer;
pub mod shutdown;
pub mod stats;
pub mod utils;

pub use codec::OrderCodec;
pub use config::Config;
pub use ledger::RetryLedger;
pub use models::{DeadLetterRecord, Order};
pub use pipeline::{DeliveryOutcome, DeliveryPipeline, PipelineConfig};
pub use processor::{FailurePolicy, OrderProcessor, ProcessingError, RandomFailurePolicy};
