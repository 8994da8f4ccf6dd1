use std::collections::VecDeque;

use rand::Rng;

use crate::models::Order;
use crate::stats::AggregateStats;

// ============================================================================
// Order Processor
// ============================================================================
//
// Attempts to process a single order. Whether an attempt fails is decided by
// an injected FailurePolicy; the attempt index (taken from the retry ledger)
// decides whether that failure is retryable or permanent. Success mutates the
// aggregate stats, which is NOT idempotent - the pipeline must invoke at most
// one successful attempt per delivered message.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Temporary processing failure")]
    Retryable,

    #[error("Permanent failure - moving to DLQ")]
    Permanent,
}

/// Decides whether the next processing attempt fails. Abstracted so tests
/// can script exact failure sequences instead of sampling randomness.
pub trait FailurePolicy: Send {
    fn should_fail(&mut self) -> bool;
}

/// Fails with a fixed probability, the simulated-outage policy used by the
/// running service.
pub struct RandomFailurePolicy {
    probability: f64,
}

impl RandomFailurePolicy {
    pub fn new(probability: f64) -> Self {
        Self { probability }
    }
}

impl FailurePolicy for RandomFailurePolicy {
    fn should_fail(&mut self) -> bool {
        rand::thread_rng().gen::<f64>() < self.probability
    }
}

/// Replays a fixed sequence of outcomes (true = fail), then always succeeds.
pub struct ScriptedFailurePolicy {
    script: VecDeque<bool>,
}

impl ScriptedFailurePolicy {
    pub fn new(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl FailurePolicy for ScriptedFailurePolicy {
    fn should_fail(&mut self) -> bool {
        self.script.pop_front().unwrap_or(false)
    }
}

/// Fails every attempt, used to exercise the dead-letter path.
pub struct AlwaysFailPolicy;

impl FailurePolicy for AlwaysFailPolicy {
    fn should_fail(&mut self) -> bool {
        true
    }
}

pub struct OrderProcessor {
    policy: Box<dyn FailurePolicy>,
    stats: AggregateStats,
    max_retries: u32,
}

impl OrderProcessor {
    pub fn new(policy: Box<dyn FailurePolicy>, max_retries: u32) -> Self {
        Self {
            policy,
            stats: AggregateStats::new(),
            max_retries,
        }
    }

    /// Process one order at the given attempt index. On success the aggregate
    /// stats are updated and a "processed" line is emitted.
    pub fn attempt(&mut self, order: &Order, attempt: u32) -> Result<(), ProcessingError> {
        let should_fail = self.policy.should_fail();

        if should_fail && attempt < self.max_retries {
            return Err(ProcessingError::Retryable);
        }
        if should_fail {
            return Err(ProcessingError::Permanent);
        }

        let running_average = self.stats.record(order.price);

        tracing::info!(
            order_id = %order.order_id,
            product = %order.product,
            price = order.price,
            running_average,
            order_count = self.stats.order_count(),
            "✅ Processed order"
        );

        Ok(())
    }

    pub fn stats(&self) -> &AggregateStats {
        &self.stats
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
