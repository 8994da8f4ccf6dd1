use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::utils::ConnectionRetryConfig;

// ============================================================================
// Configuration - environment variables with sensible defaults
// ============================================================================
//
// Every knob the system recognizes lives here. Defaults reproduce the demo
// deployment: a single local broker, "orders" / "orders-dlq" topics, three
// application-level retries, a 2s production interval and a 10% simulated
// failure rate.
//
// ============================================================================

pub const DEFAULT_ORDERS_TOPIC: &str = "orders";
pub const DEFAULT_DLQ_TOPIC: &str = "orders-dlq";

#[derive(Clone, Debug)]
pub struct Config {
    /// Comma-separated broker address list.
    pub brokers: String,
    pub client_id: String,
    pub group_id: String,
    pub orders_topic: String,
    pub dlq_topic: String,

    /// Application-level retry ceiling per order key.
    pub max_retries: u32,
    /// Unit for the linear retry backoff (delay = unit * (n + 1)).
    pub retry_backoff: Duration,
    /// Opt-in deviation: dead-letter immediately when the inline retry fails
    /// permanently, instead of waiting for redelivery.
    pub dead_letter_on_inline_permanent: bool,

    /// Broker connection retry policy (startup probe + librdkafka retries).
    pub connection_retry: ConnectionRetryConfig,

    /// Producer: interval between synthesized orders.
    pub produce_interval: Duration,
    /// Probability that a processing attempt fails (simulation).
    pub failure_probability: f64,

    pub metrics_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let max_retries = env_parse("MAX_RETRIES", 3u32)?;
        let connection_retry = ConnectionRetryConfig {
            max_attempts: env_parse("CONNECT_MAX_RETRIES", 8u32)?.max(1),
            initial_delay: Duration::from_millis(env_parse("CONNECT_INITIAL_BACKOFF_MS", 100u64)?),
            max_delay: Duration::from_millis(env_parse("CONNECT_MAX_BACKOFF_MS", 30_000u64)?),
        };

        let failure_probability: f64 = env_parse("FAILURE_PROBABILITY", 0.1f64)?;
        anyhow::ensure!(
            (0.0..=1.0).contains(&failure_probability),
            "FAILURE_PROBABILITY must be within [0.0, 1.0], got {failure_probability}"
        );

        Ok(Self {
            brokers: env_or("KAFKA_BROKERS", "localhost:9092"),
            client_id: env_or("CLIENT_ID", "order-system"),
            group_id: env_or("GROUP_ID", "order-processor"),
            orders_topic: env_or("ORDERS_TOPIC", DEFAULT_ORDERS_TOPIC),
            dlq_topic: env_or("DLQ_TOPIC", DEFAULT_DLQ_TOPIC),
            max_retries,
            retry_backoff: Duration::from_millis(env_parse("RETRY_BACKOFF_MS", 1000u64)?),
            dead_letter_on_inline_permanent: env_parse(
                "DEAD_LETTER_ON_INLINE_PERMANENT",
                false,
            )?,
            connection_retry,
            produce_interval: Duration::from_millis(env_parse("PRODUCE_INTERVAL_MS", 2000u64)?),
            failure_probability,
            metrics_port: env_parse("METRICS_PORT", 9090u16)?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
