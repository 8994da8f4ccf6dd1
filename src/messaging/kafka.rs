use std::time::Duration;

use anyhow::{Context, Result};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};

use crate::config::Config;

// ============================================================================
// Kafka Collaborators
// ============================================================================
//
// Thin wrappers over rdkafka. The broker is an external collaborator: this
// module only knows how to build clients from Config, publish a keyed byte
// payload and flush on shutdown. All routing decisions live in the pipeline.
//
// ============================================================================

#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    pub fn new(config: &Config) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &config.client_id)
            .set("message.timeout.ms", "5000")
            // Broker-level send retry policy, from the connection retry config
            .set("retries", config.connection_retry.max_attempts.to_string())
            .set(
                "retry.backoff.ms",
                config.connection_retry.initial_delay.as_millis().to_string(),
            )
            .set(
                "retry.backoff.max.ms",
                config.connection_retry.max_delay.as_millis().to_string(),
            )
            .create()
            .context("Failed to create Kafka producer")?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        self.producer
            .send(record, rdkafka::util::Timeout::After(Duration::from_secs(5)))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("Kafka send error: {}", e))?;

        tracing::debug!(topic = %topic, key = %key, "Published to Kafka");
        Ok(())
    }

    /// Fetch cluster metadata to confirm the broker is reachable. rdkafka
    /// connects lazily, so this is the startup-time liveness check.
    pub fn probe(&self, timeout: Duration) -> Result<()> {
        self.producer
            .client()
            .fetch_metadata(None, timeout)
            .map(|_| ())
            .context("Broker metadata fetch failed")
    }

    /// Block until buffered messages are delivered, bounded by `timeout`.
    pub fn flush(&self, timeout: Duration) -> Result<()> {
        self.producer
            .flush(timeout)
            .context("Failed to flush Kafka producer")
    }
}

/// Build the order-topic consumer: consumer-group membership, reads from the
/// beginning of the topic on first start, offsets committed manually after
/// each handled message.
pub fn build_consumer(config: &Config) -> Result<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .set("client.id", &config.client_id)
        .set("group.id", &config.group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("session.timeout.ms", "30000")
        .set("heartbeat.interval.ms", "3000")
        // Backoff inside the pipeline can hold a message for several seconds,
        // keep the poll interval well clear of the worst case
        .set("max.poll.interval.ms", "300000")
        .create()
        .context("Failed to create Kafka consumer")?;

    consumer
        .subscribe(&[&config.orders_topic])
        .context("Failed to subscribe to orders topic")?;

    tracing::info!(
        brokers = %config.brokers,
        topic = %config.orders_topic,
        group = %config.group_id,
        "Kafka consumer subscribed"
    );

    Ok(consumer)
}
