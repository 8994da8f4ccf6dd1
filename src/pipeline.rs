use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::codec::OrderCodec;
use crate::config::Config;
use crate::dlq::DeadLetterSink;
use crate::ledger::RetryLedger;
use crate::metrics::Metrics;
use crate::models::Order;
use crate::processor::{OrderProcessor, ProcessingError};

// ============================================================================
// Delivery Pipeline - the retry / dead-letter state machine
// ============================================================================
//
// One logical worker handles inbound messages strictly in delivery order.
// Per-key states: Fresh (no ledger entry) -> Retrying(n) -> Succeeded or
// DeadLettered. A failed attempt below the retry ceiling bumps the ledger,
// waits out a linear backoff (unit * (n+1), the only suspension point) and
// re-attempts exactly once inline. If that inline attempt also fails, the
// message is left as-is and the key resolves on the next delivery carrying
// it - even when the inline failure was permanent. That stall is inherited
// behavior; DEAD_LETTER_ON_INLINE_PERMANENT opts into dead-lettering such
// messages immediately instead.
//
// Messages whose payload fails to decode are logged and dropped: no ledger
// mutation, no stats mutation, no DLQ record. No per-message error ever
// aborts consumption of subsequent messages.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub max_retries: u32,
    pub backoff_unit: Duration,
    pub dead_letter_on_inline_permanent: bool,
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_unit: config.retry_backoff,
            dead_letter_on_inline_permanent: config.dead_letter_on_inline_permanent,
        }
    }
}

/// Terminal result of handling one inbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Succeeded,
    /// Inline retry failed too; the ledger keeps the bumped count and the
    /// key resolves on redelivery.
    AwaitingRedelivery { attempt: u32 },
    DeadLettered,
    /// Payload failed to decode.
    Dropped,
    /// Shutdown arrived during the backoff suspension; the message was
    /// abandoned and redelivery re-derives state from the ledger.
    Cancelled,
}

impl DeliveryOutcome {
    /// Whether the consumer may commit the message's offset. An abandoned
    /// message must stay uncommitted so the broker redelivers it after
    /// restart; every other outcome is a handled message.
    pub fn commits_offset(&self) -> bool {
        !matches!(self, DeliveryOutcome::Cancelled)
    }
}

pub struct DeliveryPipeline<S: DeadLetterSink> {
    codec: OrderCodec,
    ledger: RetryLedger,
    processor: OrderProcessor,
    dlq: S,
    config: PipelineConfig,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
}

impl<S: DeadLetterSink> DeliveryPipeline<S> {
    pub fn new(
        codec: OrderCodec,
        processor: OrderProcessor,
        dlq: S,
        config: PipelineConfig,
        metrics: Arc<Metrics>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            codec,
            ledger: RetryLedger::new(),
            processor,
            dlq,
            config,
            metrics,
            shutdown,
        }
    }

    /// Handle one inbound message end to end.
    pub async fn handle_message(&mut self, payload: &[u8]) -> DeliveryOutcome {
        let timer = self.metrics.handling_duration.start_timer();
        let outcome = self.handle_inner(payload).await;
        timer.observe_duration();

        self.metrics
            .retry_ledger_entries
            .set(self.ledger.len() as i64);

        outcome
    }

    async fn handle_inner(&mut self, payload: &[u8]) -> DeliveryOutcome {
        let order = match self.codec.decode(payload) {
            Ok(order) => order,
            Err(error) => {
                tracing::error!(error = %error, "Dropping undecodable message");
                self.metrics.messages_dropped.inc();
                return DeliveryOutcome::Dropped;
            }
        };

        let key = order.order_id.clone();
        let attempt = self.ledger.get(&key);

        match self.processor.attempt(&order, attempt) {
            Ok(()) => self.complete(&key),
            Err(error) if attempt < self.config.max_retries => {
                self.retry_inline(&order, &key, attempt, error).await
            }
            Err(error) => self.route_to_dlq(&order, &key, error).await,
        }
    }

    /// Bump the ledger, wait out the linear backoff, re-attempt exactly once.
    async fn retry_inline(
        &mut self,
        order: &Order,
        key: &str,
        attempt: u32,
        error: ProcessingError,
    ) -> DeliveryOutcome {
        let next = self.ledger.increment(key);
        self.metrics
            .orders_retried
            .with_label_values(&[&next.to_string()])
            .inc();

        tracing::warn!(
            order_id = %key,
            attempt = next,
            max_retries = self.config.max_retries,
            error = %error,
            "🔄 Retrying order"
        );

        let delay = self.config.backoff_unit * next;
        tokio::select! {
            _ = self.shutdown.cancelled() => {
                tracing::info!(order_id = %key, "Shutdown during backoff, abandoning message");
                return DeliveryOutcome::Cancelled;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        match self.processor.attempt(order, next) {
            Ok(()) => self.complete(key),
            Err(ProcessingError::Permanent) if self.config.dead_letter_on_inline_permanent => {
                self.route_to_dlq(order, key, ProcessingError::Permanent)
                    .await
            }
            Err(inline_error) => {
                // Ledger stays at `next`; the key resolves when the broker
                // redelivers a message with this key.
                tracing::warn!(
                    order_id = %key,
                    attempt = next,
                    error = %inline_error,
                    "Inline retry failed, deferring to redelivery"
                );
                DeliveryOutcome::AwaitingRedelivery { attempt: next }
            }
        }
    }

    fn complete(&mut self, key: &str) -> DeliveryOutcome {
        self.ledger.clear(key);
        self.metrics.orders_processed.inc();
        DeliveryOutcome::Succeeded
    }

    /// The retry ceiling is spent, hand the order to the sink. A failed
    /// publish loses the record; it is logged and counted, never propagated.
    async fn route_to_dlq(
        &mut self,
        order: &Order,
        key: &str,
        error: ProcessingError,
    ) -> DeliveryOutcome {
        if let Err(publish_error) = self.dlq.send(order, &error.to_string()).await {
            tracing::error!(
                order_id = %key,
                error = %publish_error,
                "Failed to publish dead-letter record, dropping it"
            );
            self.metrics.dlq_publish_failures.inc();
        }

        self.ledger.clear(key);
        self.metrics.orders_dead_lettered.inc();
        DeliveryOutcome::DeadLettered
    }

    pub fn ledger(&self) -> &RetryLedger {
        &self.ledger
    }

    pub fn processor(&self) -> &OrderProcessor {
        &self.processor
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlq::PublishError;
    use crate::processor::{AlwaysFailPolicy, FailurePolicy, ScriptedFailurePolicy};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const MAX_RETRIES: u32 = 3;
    const BACKOFF_UNIT: Duration = Duration::from_millis(1000);

    /// Records every (order, error) pair instead of publishing.
    #[derive(Default)]
    struct RecordingSink {
        records: Arc<Mutex<Vec<(Order, String)>>>,
        fail_publish: bool,
    }

    #[async_trait]
    impl DeadLetterSink for Arc<RecordingSink> {
        async fn send(&self, order: &Order, error: &str) -> Result<(), PublishError> {
            if self.fail_publish {
                return Err(PublishError::Broker("simulated outage".to_string()));
            }
            self.records
                .lock()
                .unwrap()
                .push((order.clone(), error.to_string()));
            Ok(())
        }
    }

    struct Harness {
        pipeline: DeliveryPipeline<Arc<RecordingSink>>,
        sink: Arc<RecordingSink>,
        metrics: Arc<Metrics>,
        codec: OrderCodec,
    }

    fn harness(policy: Box<dyn FailurePolicy>) -> Harness {
        harness_with(policy, false, false)
    }

    fn harness_with(
        policy: Box<dyn FailurePolicy>,
        dead_letter_on_inline_permanent: bool,
        fail_publish: bool,
    ) -> Harness {
        let sink = Arc::new(RecordingSink {
            records: Arc::new(Mutex::new(Vec::new())),
            fail_publish,
        });
        let metrics = Arc::new(Metrics::new().unwrap());
        let pipeline = DeliveryPipeline::new(
            OrderCodec::new().unwrap(),
            OrderProcessor::new(policy, MAX_RETRIES),
            sink.clone(),
            PipelineConfig {
                max_retries: MAX_RETRIES,
                backoff_unit: BACKOFF_UNIT,
                dead_letter_on_inline_permanent,
            },
            metrics.clone(),
            CancellationToken::new(),
        );
        Harness {
            pipeline,
            sink,
            metrics,
            codec: OrderCodec::new().unwrap(),
        }
    }

    fn encoded(codec: &OrderCodec, id: &str, price: f64) -> Vec<u8> {
        codec
            .encode(&Order {
                order_id: id.to_string(),
                product: "Keyboard".to_string(),
                price,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_message_succeeds_first_try() {
        let mut h = harness(Box::new(ScriptedFailurePolicy::new([false])));
        let payload = encoded(&h.codec, "ORD-0010", 42.0);

        let outcome = h.pipeline.handle_message(&payload).await;

        assert_eq!(outcome, DeliveryOutcome::Succeeded);
        assert!(h.pipeline.ledger().is_empty());
        assert_eq!(h.pipeline.processor().stats().order_count(), 1);
        assert_eq!(h.metrics.orders_processed.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inline_retry_success_counts_stats_exactly_once() {
        // ORD-0002 scenario: fails at n=0, succeeds on the inline retry.
        let mut h = harness(Box::new(ScriptedFailurePolicy::new([true, false])));
        let payload = encoded(&h.codec, "ORD-0002", 30.0);

        let outcome = h.pipeline.handle_message(&payload).await;

        assert_eq!(outcome, DeliveryOutcome::Succeeded);
        assert!(h.pipeline.ledger().is_empty());
        assert_eq!(h.pipeline.processor().stats().order_count(), 1);
        assert_eq!(h.pipeline.processor().stats().total_price(), 30.0);
        assert!(h.sink.records.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_four_failures_route_to_dlq_and_clear_ledger() {
        // ORD-0001 scenario: four consecutive deliveries of an order that
        // always fails. The ledger climbs to 3, never past it, and the
        // fourth delivery dead-letters.
        let mut h = harness(Box::new(AlwaysFailPolicy));
        let payload = encoded(&h.codec, "ORD-0001", 99.0);

        assert_eq!(
            h.pipeline.handle_message(&payload).await,
            DeliveryOutcome::AwaitingRedelivery { attempt: 1 }
        );
        assert_eq!(
            h.pipeline.handle_message(&payload).await,
            DeliveryOutcome::AwaitingRedelivery { attempt: 2 }
        );
        assert_eq!(
            h.pipeline.handle_message(&payload).await,
            DeliveryOutcome::AwaitingRedelivery { attempt: 3 }
        );
        assert_eq!(h.pipeline.ledger().get("ORD-0001"), 3);

        assert_eq!(
            h.pipeline.handle_message(&payload).await,
            DeliveryOutcome::DeadLettered
        );

        assert!(h.pipeline.ledger().is_empty());
        assert_eq!(h.pipeline.processor().stats().order_count(), 0);

        let records = h.sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0.order_id, "ORD-0001");
        assert!(!records[0].1.is_empty());
        drop(records);
        assert_eq!(h.metrics.orders_dead_lettered.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_linear_in_attempt_count() {
        let mut h = harness(Box::new(AlwaysFailPolicy));
        let payload = encoded(&h.codec, "ORD-0003", 5.0);

        let start = tokio::time::Instant::now();
        h.pipeline.handle_message(&payload).await;
        let first = start.elapsed();
        assert!(first >= Duration::from_millis(1000), "{first:?}");
        assert!(first < Duration::from_millis(2000), "{first:?}");

        let start = tokio::time::Instant::now();
        h.pipeline.handle_message(&payload).await;
        let second = start.elapsed();
        assert!(second >= Duration::from_millis(2000), "{second:?}");
        assert!(second < Duration::from_millis(3000), "{second:?}");
    }

    #[tokio::test]
    async fn test_decode_failure_drops_without_side_effects() {
        let mut h = harness(Box::new(AlwaysFailPolicy));

        let outcome = h.pipeline.handle_message(b"definitely not avro").await;

        assert_eq!(outcome, DeliveryOutcome::Dropped);
        assert!(h.pipeline.ledger().is_empty());
        assert_eq!(h.pipeline.processor().stats().order_count(), 0);
        assert!(h.sink.records.lock().unwrap().is_empty());
        assert_eq!(h.metrics.messages_dropped.get(), 1);

        // Pipeline keeps working afterwards
        let payload = encoded(&h.codec, "ORD-0004", 5.0);
        assert_ne!(
            h.pipeline.handle_message(&payload).await,
            DeliveryOutcome::Dropped
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_dlq_publish_is_swallowed() {
        let mut h = harness_with(Box::new(AlwaysFailPolicy), false, true);
        let payload = encoded(&h.codec, "ORD-0005", 12.0);

        for _ in 0..3 {
            h.pipeline.handle_message(&payload).await;
        }
        let outcome = h.pipeline.handle_message(&payload).await;

        // Still a terminal outcome even though the record was lost
        assert_eq!(outcome, DeliveryOutcome::DeadLettered);
        assert!(h.pipeline.ledger().is_empty());
        assert_eq!(h.metrics.dlq_publish_failures.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inline_permanent_failure_dead_letters_when_opted_in() {
        let mut h = harness_with(Box::new(AlwaysFailPolicy), true, false);
        let payload = encoded(&h.codec, "ORD-0006", 7.0);

        assert_eq!(
            h.pipeline.handle_message(&payload).await,
            DeliveryOutcome::AwaitingRedelivery { attempt: 1 }
        );
        assert_eq!(
            h.pipeline.handle_message(&payload).await,
            DeliveryOutcome::AwaitingRedelivery { attempt: 2 }
        );
        // Third delivery: n=2, inline attempt runs at n=3 which is permanent,
        // and the deviation flag dead-letters it right away.
        assert_eq!(
            h.pipeline.handle_message(&payload).await,
            DeliveryOutcome::DeadLettered
        );
        assert!(h.pipeline.ledger().is_empty());
        assert_eq!(h.sink.records.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_backoff_abandons_message() {
        let sink = Arc::new(RecordingSink::default());
        let metrics = Arc::new(Metrics::new().unwrap());
        let shutdown = CancellationToken::new();
        let mut pipeline = DeliveryPipeline::new(
            OrderCodec::new().unwrap(),
            OrderProcessor::new(Box::new(AlwaysFailPolicy), MAX_RETRIES),
            sink.clone(),
            PipelineConfig {
                max_retries: MAX_RETRIES,
                backoff_unit: BACKOFF_UNIT,
                dead_letter_on_inline_permanent: false,
            },
            metrics,
            shutdown.clone(),
        );

        shutdown.cancel();

        let codec = OrderCodec::new().unwrap();
        let payload = encoded(&codec, "ORD-0007", 3.0);
        let outcome = pipeline.handle_message(&payload).await;

        assert_eq!(outcome, DeliveryOutcome::Cancelled);
        // The ledger bump from before the backoff stays; redelivery
        // re-derives state from it
        assert_eq!(pipeline.ledger().get("ORD-0007"), 1);
        assert!(sink.records.lock().unwrap().is_empty());

        // An abandoned message must not have its offset committed, or the
        // broker would never redeliver it
        assert!(!outcome.commits_offset());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handled_outcomes_commit_their_offset() {
        let mut h = harness(Box::new(ScriptedFailurePolicy::new([false, true, true])));
        let payload = encoded(&h.codec, "ORD-0009", 2.0);

        // Succeeded
        assert!(h.pipeline.handle_message(&payload).await.commits_offset());
        // Dropped
        assert!(h.pipeline.handle_message(b"garbage").await.commits_offset());
        // AwaitingRedelivery: handled, resolution rides on the NEXT message
        // for the key, so this offset is done
        assert!(h.pipeline.handle_message(&payload).await.commits_offset());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dlq_records_are_not_deduplicated() {
        let mut h = harness(Box::new(AlwaysFailPolicy));
        let payload = encoded(&h.codec, "ORD-0008", 1.0);

        // Drive the same key to the DLQ twice
        for _ in 0..2 {
            for _ in 0..3 {
                h.pipeline.handle_message(&payload).await;
            }
            assert_eq!(
                h.pipeline.handle_message(&payload).await,
                DeliveryOutcome::DeadLettered
            );
        }

        assert_eq!(h.sink.records.lock().unwrap().len(), 2);
    }
}
