use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_stream::config::Config;
use order_stream::messaging::KafkaProducer;
use order_stream::metrics::{spawn_metrics_server, Metrics};
use order_stream::producer::run_producer;
use order_stream::shutdown;
use order_stream::utils::retry_connection;
use order_stream::OrderCodec;

#[tokio::main]
async fn main() -> Result<()> {
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
        topic = %config.orders_topic,
        interval_ms = config.produce_interval.as_millis() as u64,
        "🚀 Starting order producer"
    );

    let producer = KafkaProducer::new(&config)?;
    retry_connection(&config.connection_retry, |_attempt| {
        let producer = producer.clone();
        async move { producer.probe(Duration::from_secs(5)) }
    })
    .await?;
    tracing::info!("Producer connected");

    let metrics = Arc::new(Metrics::new()?);
    spawn_metrics_server(
        Arc::new(metrics.registry().clone()),
        "order-producer",
        config.metrics_port,
    );

    let shutdown = shutdown::shutdown_token();

    run_producer(
        producer.clone(),
        OrderCodec::new()?,
        config,
        metrics,
        shutdown,
    )
    .await?;

    tracing::info!("Shutting down, flushing broker connections");
    if let Err(error) = producer.flush(Duration::from_secs(5)) {
        tracing::error!(error = %error, "Flush on shutdown failed");
    }

    Ok(())
}
