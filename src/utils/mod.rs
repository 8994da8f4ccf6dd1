pub mod backoff;

pub use backoff::{retry_connection, ConnectionRetryConfig};
