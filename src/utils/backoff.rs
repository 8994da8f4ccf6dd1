use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

// ============================================================================
// Connection Retry - bounded exponential backoff
// ============================================================================
//
// Used for startup-time broker probes. Application-level message retry is a
// different animal and lives in the delivery pipeline; this is only for
// "is the broker there yet" style operations where the whole process should
// keep trying for a while and then give up fatally.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct ConnectionRetryConfig {
    /// Maximum number of attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Ceiling for the delay between attempts.
    pub max_delay: Duration,
}

impl Default for ConnectionRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Run `operation` until it succeeds or `max_attempts` is exhausted, doubling
/// the delay between attempts up to `max_delay`. Returns the last error when
/// all attempts fail.
pub async fn retry_connection<F, Fut, T, E>(
    config: &ConnectionRetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Connection established after retry");
                }
                return Ok(result);
            }
            Err(error) if attempt >= config.max_attempts => {
                tracing::error!(
                    attempt,
                    error = %error,
                    "Connection failed, retries exhausted"
                );
                return Err(error);
            }
            Err(error) => {
                tracing::warn!(
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis(),
                    "Connection failed, retrying after delay"
                );
                sleep(delay).await;
                delay = (delay * 2).min(config.max_delay);
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
