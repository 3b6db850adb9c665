//! Application configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use gatekeep_core::{FailurePolicy, LimiterPolicy, UpdateMode};

#[cfg(feature = "redis")]
use gatekeep_infra::RedisStoreConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub limiter: LimiterPolicy,
    #[cfg(feature = "redis")]
    pub store: Option<RedisStoreConfig>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8081),
            limiter: Self::limiter_from_env(),
            #[cfg(feature = "redis")]
            store: env::var("REDIS_URL")
                .ok()
                .map(|_| RedisStoreConfig::from_env()),
        }
    }

    fn limiter_from_env() -> LimiterPolicy {
        let defaults = LimiterPolicy::default();

        let on_store_failure = match env::var("RATE_LIMIT_FAIL_POLICY").ok().as_deref() {
            Some("closed") => FailurePolicy::FailClosed,
            Some("open") | None => FailurePolicy::FailOpen,
            Some(other) => {
                tracing::warn!(value = other, "unknown RATE_LIMIT_FAIL_POLICY, using open");
                FailurePolicy::FailOpen
            }
        };

        let update_mode = match env::var("RATE_LIMIT_UPDATE_MODE").ok().as_deref() {
            Some("read-modify-write") => UpdateMode::ReadModifyWrite,
            Some("atomic") | None => UpdateMode::Atomic,
            Some(other) => {
                tracing::warn!(value = other, "unknown RATE_LIMIT_UPDATE_MODE, using atomic");
                UpdateMode::Atomic
            }
        };

        LimiterPolicy {
            window: Duration::from_secs(
                env::var("RATE_LIMIT_WINDOW_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.window.as_secs()),
            ),
            expiry: Duration::from_secs(
                env::var("RATE_LIMIT_EXPIRY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.expiry.as_secs()),
            ),
            threshold: env::var("RATE_LIMIT_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.threshold),
            on_store_failure,
            update_mode,
        }
    }
}
