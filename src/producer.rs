use std::sync::Arc;

use anyhow::Result;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::codec::OrderCodec;
use crate::config::Config;
use crate::messaging::KafkaProducer;
use crate::metrics::Metrics;
use crate::models::Order;
use crate::stats::round2;

// ============================================================================
// Producer Loop - synthesizes and publishes orders
// ============================================================================

const PRODUCTS: [&str; 6] = ["Laptop", "Phone", "Tablet", "Headphones", "Mouse", "Keyboard"];

/// Synthesizes orders with sequential zero-padded ids, a random product and
/// a random 2-decimal price in 10.00..1010.00.
#[derive(Debug, Default)]
pub struct OrderGenerator {
    counter: u32,
}

impl OrderGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_order(&mut self) -> Order {
        self.counter += 1;
        let mut rng = rand::thread_rng();

        Order {
            order_id: format!("ORD-{:04}", self.counter),
            product: PRODUCTS[rng.gen_range(0..PRODUCTS.len())].to_string(),
            price: round2(rng.gen_range(10.0..1010.0)),
        }
    }
}

/// Publish one encoded order per production interval until shutdown.
/// Per-order encode or publish errors are logged and the loop keeps going.
pub async fn run_producer(
    producer: KafkaProducer,
    codec: OrderCodec,
    config: Config,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut generator = OrderGenerator::new();
    let mut ticker = tokio::time::interval(config.produce_interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Producer loop stopping");
                return Ok(());
            }
            _ = ticker.tick() => {
                let order = generator.next_order();

                let payload = match codec.encode(&order) {
                    Ok(payload) => payload,
                    Err(error) => {
                        tracing::error!(order_id = %order.order_id, error = %error, "Failed to encode order");
                        continue;
                    }
                };

                match producer
                    .publish(&config.orders_topic, &order.order_id, &payload)
                    .await
                {
                    Ok(()) => {
                        metrics.orders_produced.inc();
                        tracing::info!(
                            order_id = %order.order_id,
                            product = %order.product,
                            price = order.price,
                            "Produced order"
                        );
                    }
                    Err(error) => {
                        tracing::error!(
                            order_id = %order.order_id,
                            error = %error,
                            "Failed to publish order"
                        );
                    }
                }
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential_and_zero_padded() {
        let mut generator = OrderGenerator::new();
        assert_eq!(generator.next_order().order_id, "ORD-0001");
        assert_eq!(generator.next_order().order_id, "ORD-0002");

        for _ in 2..42 {
            generator.next_order();
        }
        assert_eq!(generator.next_order().order_id, "ORD-0043");
    }

    #[test]
    fn test_product_comes_from_catalogue() {
        let mut generator = OrderGenerator::new();
        for _ in 0..50 {
            let order = generator.next_order();
            assert!(PRODUCTS.contains(&order.product.as_str()), "{}", order.product);
        }
    }

    #[test]
    fn test_price_is_in_range_with_two_decimals() {
        let mut generator = OrderGenerator::new();
        for _ in 0..200 {
            let price = generator.next_order().price;
            assert!((10.0..=1010.0).contains(&price), "{price}");

            let cents = price * 100.0;
            assert!((cents - cents.round()).abs() < 1e-6, "{price}");
        }
    }
}
