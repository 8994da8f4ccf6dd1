use async_trait::async_trait;

use crate::messaging::KafkaProducer;
use crate::models::{DeadLetterRecord, Order};

// ============================================================================
// Dead Letter Sink
// ============================================================================
//
// Terminal destination for orders that failed past the retry ceiling. Each
// send builds a fresh DeadLetterRecord (order + error + timestamp) and
// publishes it keyed by order id; two sends for the same order produce two
// independent records. The trait seam exists so the pipeline can be tested
// without a broker.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to serialize dead-letter record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to publish dead-letter record: {0}")]
    Broker(String),
}

#[async_trait]
pub trait DeadLetterSink: Send {
    async fn send(&self, order: &Order, error: &str) -> Result<(), PublishError>;
}

pub struct KafkaDeadLetterSink {
    producer: KafkaProducer,
    topic: String,
}

impl KafkaDeadLetterSink {
    pub fn new(producer: KafkaProducer, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl DeadLetterSink for KafkaDeadLetterSink {
    async fn send(&self, order: &Order, error: &str) -> Result<(), PublishError> {
        let record = DeadLetterRecord::new(order.clone(), error);
        let payload = serde_json::to_vec(&record)?;

        self.producer
            .publish(&self.topic, &order.order_id, &payload)
            .await
            .map_err(|e| PublishError::Broker(e.to_string()))?;

        tracing::info!(
            order_id = %order.order_id,
            error = %error,
            topic = %self.topic,
            "💀 Sent to DLQ"
        );

        Ok(())
    }
}
