use apache_avro::{from_avro_datum, from_value, to_avro_datum, to_value, Schema};

use crate::models::Order;

// ============================================================================
// Order Codec - Avro single-datum encoding for the "orders" topic
// ============================================================================
//
// The schema is fixed (orderId: string, product: string, price: double) and
// compiled into the binary from schemas/order.avsc. Values travel as raw
// Avro datums, no container file and no schema registry framing.
//
// ============================================================================

const ORDER_SCHEMA: &str = include_str!("../schemas/order.avsc");

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid order schema: {0}")]
    Schema(#[source] apache_avro::Error),

    #[error("failed to encode order: {0}")]
    Encode(#[source] apache_avro::Error),

    #[error("failed to decode order payload: {0}")]
    Decode(#[source] apache_avro::Error),
}

pub struct OrderCodec {
    schema: Schema,
}

impl OrderCodec {
    pub fn new() -> Result<Self, CodecError> {
        let schema = Schema::parse_str(ORDER_SCHEMA).map_err(CodecError::Schema)?;
        Ok(Self { schema })
    }

    pub fn encode(&self, order: &Order) -> Result<Vec<u8>, CodecError> {
        let value = to_value(order).map_err(CodecError::Encode)?;
        to_avro_datum(&self.schema, value).map_err(CodecError::Encode)
    }

    pub fn decode(&self, payload: &[u8]) -> Result<Order, CodecError> {
        let mut reader = payload;
        let value =
            from_avro_datum(&self.schema, &mut reader, None).map_err(CodecError::Decode)?;
        from_value::<Order>(&value).map_err(CodecError::Decode)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_parses() {
        assert!(OrderCodec::new().is_ok());
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let codec = OrderCodec::new().unwrap();
        let order = Order {
            order_id: "ORD-0007".to_string(),
            product: "Headphones".to_string(),
            price: 129.50,
        };

        let bytes = codec.encode(&order).unwrap();
        let decoded = codec.decode(&bytes).unwrap();

        assert_eq!(decoded, order);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let codec = OrderCodec::new().unwrap();
        let result = codec.decode(b"\xff\xfenot-an-avro-datum");
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_truncated_payload() {
        let codec = OrderCodec::new().unwrap();
        let order = Order {
            order_id: "ORD-0008".to_string(),
            product: "Mouse".to_string(),
            price: 25.00,
        };

        let bytes = codec.encode(&order).unwrap();
        let result = codec.decode(&bytes[..bytes.len() / 2]);
        assert!(result.is_err());
    }
}
