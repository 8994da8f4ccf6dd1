// ============================================================================
// Aggregate Stats - running order totals
// ============================================================================
//
// Process-wide total price and order count, owned by the delivery pipeline
// and mutated only on successful processing. The count is monotone: there is
// no decrement and no reset. Recording twice for the same order double-counts,
// so the pipeline guarantees at most one successful attempt per delivery.
//
// ============================================================================

#[derive(Debug, Default)]
pub struct AggregateStats {
    total_price: f64,
    order_count: u64,
}

impl AggregateStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one successful order and return the new running average,
    /// rounded to 2 decimals.
    pub fn record(&mut self, price: f64) -> f64 {
        self.total_price += price;
        self.order_count += 1;
        self.running_average()
    }

    pub fn running_average(&self) -> f64 {
        if self.order_count == 0 {
            return 0.0;
        }
        round2(self.total_price / self.order_count as f64)
    }

    pub fn total_price(&self) -> f64 {
        self.total_price
    }

    pub fn order_count(&self) -> u64 {
        self.order_count
    }
}

/// Round half away from zero to 2 decimals, matching how the wire prices
/// themselves are quantized.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stats() {
        let stats = AggregateStats::new();
        assert_eq!(stats.order_count(), 0);
        assert_eq!(stats.total_price(), 0.0);
        assert_eq!(stats.running_average(), 0.0);
    }

    #[test]
    fn test_record_accumulates() {
        let mut stats = AggregateStats::new();
        stats.record(10.00);
        let avg = stats.record(20.00);

        assert_eq!(stats.order_count(), 2);
        assert_eq!(stats.total_price(), 30.00);
        assert_eq!(avg, 15.00);
    }

    #[test]
    fn test_running_average_rounds_to_two_decimals() {
        let mut stats = AggregateStats::new();
        stats.record(10.00);
        stats.record(10.00);
        let avg = stats.record(10.01);

        // 30.01 / 3 = 10.003333...
        assert_eq!(avg, 10.00);

        let mut stats = AggregateStats::new();
        stats.record(0.10);
        stats.record(0.21);
        // 0.31 / 2 = 0.155 -> 0.16 (half away from zero)
        assert_eq!(stats.running_average(), 0.16);
    }

    #[test]
    fn test_count_is_monotone() {
        let mut stats = AggregateStats::new();
        for _ in 0..100 {
            stats.record(1.0);
        }
        assert_eq!(stats.order_count(), 100);
        assert_eq!(stats.total_price(), 100.0);
        assert_eq!(stats.running_average(), 1.0);
    }
}
