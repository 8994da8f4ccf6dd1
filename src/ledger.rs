use std::collections::HashMap;

// ============================================================================
// Retry Ledger - per-key retry-attempt bookkeeping
// ============================================================================
//
// In-memory only: all retry history is lost on restart, so a redelivered
// message after a restart starts over as a fresh attempt. A key is present
// only while its order is mid-retry; terminal success and dead-lettering
// both clear it. There is no capacity bound or eviction, which means a key
// whose redelivery never arrives leaks for the lifetime of the process -
// the `retry_ledger_entries` gauge exists to make that visible.
//
// Not thread-safe by contract. The delivery pipeline is the single owner
// and touches it from one in-order message loop.
//
// ============================================================================

#[derive(Debug, Default)]
pub struct RetryLedger {
    attempts: HashMap<String, u32>,
}

impl RetryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current attempt count for a key, 0 if the key is not mid-retry.
    pub fn get(&self, key: &str) -> u32 {
        self.attempts.get(key).copied().unwrap_or(0)
    }

    /// Bump the attempt count and return the new value.
    pub fn increment(&mut self, key: &str) -> u32 {
        let count = self.attempts.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Drop the entry for a key that reached a terminal outcome.
    pub fn clear(&mut self, key: &str) {
        self.attempts.remove(key);
    }

    /// Number of keys currently mid-retry.
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
