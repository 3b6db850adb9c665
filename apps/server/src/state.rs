//! Application state - shared across all workers.

use std::sync::Arc;

use gatekeep_core::DecisionEngine;
use gatekeep_core::ports::CounterStore;
use gatekeep_infra::InMemoryCounterStore;

#[cfg(feature = "redis")]
use gatekeep_infra::RedisCounterStore;

use crate::config::AppConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DecisionEngine>,
}

impl AppState {
    /// Build the application state with the appropriate counter store.
    pub async fn new(config: &AppConfig) -> Self {
        let store = Self::build_store(config).await;
        let engine = Arc::new(DecisionEngine::new(store, config.limiter.clone()));

        tracing::info!("Application state initialized");

        Self { engine }
    }

    #[cfg(feature = "redis")]
    async fn build_store(config: &AppConfig) -> Arc<dyn CounterStore> {
        match &config.store {
            Some(store_config) => match RedisCounterStore::new(store_config.clone()).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::error!(
                        "Failed to connect to Redis: {}. Using in-memory fallback.",
                        e
                    );
                    Arc::new(InMemoryCounterStore::new())
                }
            },
            None => {
                tracing::warn!(
                    "REDIS_URL not set. Counters are per-process (in-memory mode)."
                );
                Arc::new(InMemoryCounterStore::new())
            }
        }
    }

    #[cfg(not(feature = "redis"))]
    async fn build_store(_config: &AppConfig) -> Arc<dyn CounterStore> {
        tracing::info!("Running without redis feature - using in-memory counter store");
        Arc::new(InMemoryCounterStore::new())
    }
}
