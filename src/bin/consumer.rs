use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rdkafka::consumer::{CommitMode, Consumer};
use rdkafka::Message;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_stream::config::Config;
use order_stream::dlq::KafkaDeadLetterSink;
use order_stream::messaging::{build_consumer, KafkaProducer};
use order_stream::metrics::{spawn_metrics_server, Metrics};
use order_stream::pipeline::{DeliveryPipeline, PipelineConfig};
use order_stream::processor::{OrderProcessor, RandomFailurePolicy};
use order_stream::shutdown;
use order_stream::utils::retry_connection;
use order_stream::OrderCodec;

#[tokio::main]
async fn main() -> Result<()> {
    // Structured logging with environment-based filtering, override with
    // RUST_LOG (e.g. RUST_LOG=debug)
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_stream=debug")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        brokers = %config.brokers,
        group = %config.group_id,
        topic = %config.orders_topic,
        "🚀 Starting order consumer"
    );

    let metrics = Arc::new(Metrics::new()?);
    spawn_metrics_server(
        Arc::new(metrics.registry().clone()),
        "order-consumer",
        config.metrics_port,
    );

    // The DLQ publisher shares one producer; a startup connection failure is
    // the only error allowed to be fatal.
    let producer = KafkaProducer::new(&config)?;
    retry_connection(&config.connection_retry, |_attempt| {
        let producer = producer.clone();
        async move { producer.probe(Duration::from_secs(5)) }
    })
    .await?;
    tracing::info!("Consumer connected");

    let consumer = build_consumer(&config)?;
    let shutdown = shutdown::shutdown_token();

    let sink = KafkaDeadLetterSink::new(producer.clone(), config.dlq_topic.clone());
    let processor = OrderProcessor::new(
        Box::new(RandomFailurePolicy::new(config.failure_probability)),
        config.max_retries,
    );
    let mut pipeline = DeliveryPipeline::new(
        OrderCodec::new()?,
        processor,
        sink,
        PipelineConfig::from(&config),
        metrics,
        shutdown.clone(),
    );

    // Single in-order worker: one message at a time, no overlap. The retry
    // backoff deliberately holds up the next message (see pipeline docs).
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = consumer.recv() => match received {
                Ok(message) => {
                    let payload = message.payload().unwrap_or_default();
                    let outcome = pipeline.handle_message(payload).await;
                    tracing::debug!(
                        ?outcome,
                        partition = message.partition(),
                        offset = message.offset(),
                        "Handled message"
                    );

                    // A message abandoned mid-backoff was not handled; leave
                    // its offset uncommitted so the broker redelivers it.
                    if !outcome.commits_offset() {
                        break;
                    }

                    if let Err(error) = consumer.commit_message(&message, CommitMode::Async) {
                        tracing::error!(error = %error, "Failed to commit offset");
                    }
                }
                Err(error) => {
                    tracing::error!(error = %error, "Consumer error, continuing");
                }
            },
        }
    }

    tracing::info!("Shutting down, flushing broker connections");
    drop(consumer);
    if let Err(error) = producer.flush(Duration::from_secs(5)) {
        tracing::error!(error = %error, "Flush on shutdown failed");
    }

    Ok(())
}
