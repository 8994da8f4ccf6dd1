use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Domain Models
// ============================================================================
//
// Order is the value record flowing through the "orders" topic. It is created
// once by the producer and read-only everywhere else. Field names serialize
// in camelCase to match the wire schema (schemas/order.avsc) and the JSON
// dead-letter payload.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Unique key, externally assigned (e.g. "ORD-0042").
    pub order_id: String,
    pub product: String,
    /// Non-negative, 2-decimal precision.
    pub price: f64,
}

/// Payload published to the dead-letter topic. Written once per dead-lettered
/// order, never mutated, never deduplicated.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DeadLetterRecord {
    pub order: Order,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn new(order: Order, error: impl Into<String>) -> Self {
        Self {
            order,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
