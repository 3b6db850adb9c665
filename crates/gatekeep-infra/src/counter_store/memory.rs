//! In-memory counter store - used as fallback when Redis is unavailable.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use gatekeep_core::ports::{CounterStore, StoreError};

struct CounterEntry {
    value: u64,
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Instant::now() > exp)
            .unwrap_or(false)
    }
}

/// In-memory counter store using a simple HashMap with async RwLock.
///
/// Honors the same contract as the Redis store, including per-key expiry.
/// Note: counters are per-process, not shared across instances, and are
/// lost on restart.
pub struct InMemoryCounterStore {
    entries: RwLock<HashMap<String, CounterEntry>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                drop(entries);
                // Lazy cleanup. The key may have been recreated between the
                // two lock acquisitions, so re-check before removing.
                let mut entries = self.entries.write().await;
                match entries.get(key) {
                    Some(entry) if entry.is_expired() => {
                        entries.remove(key);
                        Ok(None)
                    }
                    Some(entry) => Ok(Some(entry.value)),
                    None => Ok(None),
                }
            }
            Some(entry) => Ok(Some(entry.value)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: u64) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        let expires_at = entries
            .get(key)
            .filter(|e| !e.is_expired())
            .and_then(|e| e.expires_at);
        entries.insert(key.to_string(), CounterEntry { value, expires_at });
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.value += 1;
                Ok(entry.value)
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    CounterEntry {
                        value: 1,
                        expires_at: Some(Instant::now() + ttl),
                    },
                );
                Ok(1)
            }
        }
    }
}
