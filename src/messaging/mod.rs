mod kafka;

pub use kafka::{build_consumer, KafkaProducer};
