//! Counter store port.

use std::time::Duration;

use async_trait::async_trait;

/// Counter store trait - abstraction over the shared key-value store holding
/// per-window request counters (Redis, in-memory).
///
/// Implementations must be safe for concurrent use by many in-flight requests
/// and must bound every operation by a timeout. A missing key is not an
/// error: `get` reports it as `Ok(None)`.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the counter under `key`, `None` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Write `value` under `key`. Does not touch any existing expiry.
    async fn set(&self, key: &str, value: u64) -> Result<(), StoreError>;

    /// Set the time-to-live for an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Atomically increment the counter under `key` and return the
    /// post-increment value. When the increment creates the key, `ttl` is
    /// applied; an existing key's expiry is left untouched.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;
}

/// Counter store failures. Both variants mean the store could not answer;
/// they are kept distinct so timeouts are visible in logs.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store operation timed out")]
    Timeout,
}
