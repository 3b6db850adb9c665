//! Rate decision engine - fixed-window admission checks against the counter
//! store.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::domain::{ClientIdentity, Decision, RejectReason, TimeBucket, Verdict, bucket_key};
use crate::ports::CounterStore;

/// Admission policy for the engine.
#[derive(Debug, Clone)]
pub struct LimiterPolicy {
    /// Width of one counting window.
    pub window: Duration,
    /// Store TTL applied when a counter key is created. Must be at least
    /// `window` so a key survives its whole window; the engine clamps it up.
    pub expiry: Duration,
    /// Maximum counter value that still admits a request. The check is
    /// `count > threshold` on the pre-increment value, so exactly
    /// `threshold + 1` requests are admitted per window.
    pub threshold: u64,
    /// What to do when the store cannot answer.
    pub on_store_failure: FailurePolicy,
    /// How the counter is updated.
    pub update_mode: UpdateMode,
}

impl Default for LimiterPolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            expiry: Duration::from_secs(300),
            threshold: 10,
            on_store_failure: FailurePolicy::FailOpen,
            update_mode: UpdateMode::Atomic,
        }
    }
}

/// Verdict to apply when the counter store is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Admit the request without a counter read.
    FailOpen,
    /// Reject the request until the store recovers.
    FailClosed,
}

/// Counter update strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Single atomic increment-and-fetch round trip. Free of the lost-update
    /// race and the default.
    Atomic,
    /// Separate read and write. Two concurrent requests can observe the same
    /// pre-increment value and undercount; kept for compatibility with
    /// deployments that expect the two-step counter semantics.
    ReadModifyWrite,
}

/// Stateless decision engine. All counter state lives in the external store,
/// so any number of replicas can share one quota.
pub struct DecisionEngine {
    store: Arc<dyn CounterStore>,
    policy: LimiterPolicy,
}

impl DecisionEngine {
    pub fn new(store: Arc<dyn CounterStore>, mut policy: LimiterPolicy) -> Self {
        if policy.expiry < policy.window {
            tracing::warn!(
                expiry_secs = policy.expiry.as_secs(),
                window_secs = policy.window.as_secs(),
                "counter expiry shorter than the window, clamping up"
            );
            policy.expiry = policy.window;
        }
        Self { store, policy }
    }

    pub fn policy(&self) -> &LimiterPolicy {
        &self.policy
    }

    /// Admission check for `identity` at the current wall-clock time.
    pub async fn decide(&self, identity: &ClientIdentity) -> Decision {
        let now_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        self.decide_at(identity, now_unix).await
    }

    /// Admission check for `identity` at an explicit unix timestamp.
    pub async fn decide_at(&self, identity: &ClientIdentity, now_unix: i64) -> Decision {
        let bucket = TimeBucket::at(now_unix, self.policy.window);
        let key = bucket_key(identity, bucket);
        let retry_after = self.window_remainder(now_unix);

        match self.policy.update_mode {
            UpdateMode::Atomic => self.decide_atomic(&key, retry_after).await,
            UpdateMode::ReadModifyWrite => self.decide_read_modify_write(&key, retry_after).await,
        }
    }

    async fn decide_atomic(&self, key: &str, retry_after: Duration) -> Decision {
        match self.store.incr_with_ttl(key, self.policy.expiry).await {
            Ok(count) => {
                // INCR yields the post-increment count, so the two-step check
                // on the pre-increment value (`v > threshold`) becomes
                // `count > threshold + 1` here. Past the threshold the stored
                // value keeps growing; only the admission decision matters.
                let verdict = if count > self.policy.threshold.saturating_add(1) {
                    Verdict::Reject(RejectReason::ThresholdExceeded)
                } else {
                    Verdict::Admit
                };
                Decision {
                    verdict,
                    count: Some(count),
                    fallback: false,
                    retry_after,
                }
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "counter store failed");
                self.fallback_decision(retry_after)
            }
        }
    }

    async fn decide_read_modify_write(&self, key: &str, retry_after: Duration) -> Decision {
        match self.store.get(key).await {
            // First request for this client in this window.
            Ok(None) => {
                self.initialize_counter(key).await;
                Decision {
                    verdict: Verdict::Admit,
                    count: Some(1),
                    fallback: false,
                    retry_after,
                }
            }
            Ok(Some(count)) if count > self.policy.threshold => {
                // Quota exhausted; rejected requests leave the counter as is.
                Decision {
                    verdict: Verdict::Reject(RejectReason::ThresholdExceeded),
                    count: Some(count),
                    fallback: false,
                    retry_after,
                }
            }
            Ok(Some(count)) => {
                // Expiry was set at creation and is not refreshed here.
                if let Err(e) = self.store.set(key, count + 1).await {
                    tracing::warn!(key, error = %e, "counter update failed, admitting anyway");
                }
                Decision {
                    verdict: Verdict::Admit,
                    count: Some(count + 1),
                    fallback: false,
                    retry_after,
                }
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "counter store failed");
                if self.policy.on_store_failure == FailurePolicy::FailOpen {
                    // Best-effort reinitialization, mirroring the first-request
                    // path, so the window has a counter if the store recovers.
                    self.initialize_counter(key).await;
                }
                self.fallback_decision(retry_after)
            }
        }
    }

    async fn initialize_counter(&self, key: &str) {
        if let Err(e) = self.store.set(key, 1).await {
            tracing::warn!(key, error = %e, "counter initialization failed, admitting anyway");
            return;
        }
        if let Err(e) = self.store.expire(key, self.policy.expiry).await {
            tracing::warn!(key, error = %e, "setting counter expiry failed");
        }
    }

    fn fallback_decision(&self, retry_after: Duration) -> Decision {
        let verdict = match self.policy.on_store_failure {
            FailurePolicy::FailOpen => Verdict::Admit,
            FailurePolicy::FailClosed => Verdict::Reject(RejectReason::StoreUnavailable),
        };
        Decision {
            verdict,
            count: None,
            fallback: true,
            retry_after,
        }
    }

    /// Seconds left in the window containing `now_unix`.
    fn window_remainder(&self, now_unix: i64) -> Duration {
        let window_secs = self.policy.window.as_secs().max(1) as i64;
        Duration::from_secs((window_secs - now_unix.rem_euclid(window_secs)) as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::ports::StoreError;

    struct FakeEntry {
        value: u64,
        ttl: Option<Duration>,
    }

    /// Store double with injectable unavailability.
    #[derive(Default)]
    struct FakeStore {
        entries: Mutex<HashMap<String, FakeEntry>>,
        expire_calls: AtomicUsize,
        down: AtomicBool,
    }

    impl FakeStore {
        fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }

        fn value_of(&self, key: &str) -> Option<u64> {
            self.entries.lock().unwrap().get(key).map(|e| e.value)
        }

        fn ttl_of(&self, key: &str) -> Option<Duration> {
            self.entries.lock().unwrap().get(key).and_then(|e| e.ttl)
        }

        fn check_down(&self) -> Result<(), StoreError> {
            if self.down.load(Ordering::SeqCst) {
                Err(StoreError::Unavailable("injected outage".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CounterStore for FakeStore {
        async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
            self.check_down()?;
            Ok(self.value_of(key))
        }

        async fn set(&self, key: &str, value: u64) -> Result<(), StoreError> {
            self.check_down()?;
            let mut entries = self.entries.lock().unwrap();
            let ttl = entries.get(key).and_then(|e| e.ttl);
            entries.insert(key.to_string(), FakeEntry { value, ttl });
            Ok(())
        }

        async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
            self.check_down()?;
            self.expire_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(entry) = self.entries.lock().unwrap().get_mut(key) {
                entry.ttl = Some(ttl);
            }
            Ok(())
        }

        async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
            self.check_down()?;
            let mut entries = self.entries.lock().unwrap();
            let entry = entries.entry(key.to_string()).or_insert(FakeEntry {
                value: 0,
                ttl: Some(ttl),
            });
            entry.value += 1;
            Ok(entry.value)
        }
    }

    fn engine_with(policy: LimiterPolicy) -> (Arc<FakeStore>, DecisionEngine) {
        let store = Arc::new(FakeStore::default());
        let engine = DecisionEngine::new(store.clone(), policy);
        (store, engine)
    }

    fn reference_policy(update_mode: UpdateMode) -> LimiterPolicy {
        LimiterPolicy {
            update_mode,
            ..LimiterPolicy::default()
        }
    }

    const NOW: i64 = 1_700_000_000;

    #[tokio::test]
    async fn first_request_creates_counter_at_one() {
        let (store, engine) = engine_with(reference_policy(UpdateMode::ReadModifyWrite));
        let id = ClientIdentity::new("1.2.3.4");

        let decision = engine.decide_at(&id, NOW).await;

        assert_eq!(decision.verdict, Verdict::Admit);
        assert_eq!(decision.count, Some(1));
        let key = bucket_key(&id, TimeBucket::at(NOW, engine.policy().window));
        assert_eq!(store.value_of(&key), Some(1));
        assert_eq!(store.ttl_of(&key), Some(Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn admits_eleven_then_rejects_the_twelfth() {
        // Threshold 10 admits exactly 11 requests: the stored count must
        // exceed the threshold before rejection starts.
        for mode in [UpdateMode::ReadModifyWrite, UpdateMode::Atomic] {
            let (_, engine) = engine_with(reference_policy(mode));
            let id = ClientIdentity::new("1.2.3.4");

            for n in 1..=11 {
                let decision = engine.decide_at(&id, NOW + (n % 5)).await;
                assert_eq!(decision.verdict, Verdict::Admit, "request {n} in {mode:?}");
            }
            let decision = engine.decide_at(&id, NOW + 5).await;
            assert_eq!(
                decision.verdict,
                Verdict::Reject(RejectReason::ThresholdExceeded),
                "request 12 in {mode:?}"
            );
        }
    }

    #[tokio::test]
    async fn rejected_requests_leave_the_counter_unchanged() {
        let (store, engine) = engine_with(reference_policy(UpdateMode::ReadModifyWrite));
        let id = ClientIdentity::new("1.2.3.4");

        for _ in 0..11 {
            engine.decide_at(&id, NOW).await;
        }
        let key = bucket_key(&id, TimeBucket::at(NOW, engine.policy().window));
        assert_eq!(store.value_of(&key), Some(11));

        for _ in 0..3 {
            let decision = engine.decide_at(&id, NOW).await;
            assert!(!decision.is_admitted());
        }
        assert_eq!(store.value_of(&key), Some(11));
    }

    #[tokio::test]
    async fn windows_count_independently() {
        let (_, engine) = engine_with(reference_policy(UpdateMode::Atomic));
        let id = ClientIdentity::new("1.2.3.4");

        for _ in 0..12 {
            engine.decide_at(&id, NOW).await;
        }
        assert!(!engine.decide_at(&id, NOW).await.is_admitted());

        // One window later the client starts fresh.
        let next_window = NOW + 60;
        let decision = engine.decide_at(&id, next_window).await;
        assert_eq!(decision.verdict, Verdict::Admit);
        assert_eq!(decision.count, Some(1));
    }

    #[tokio::test]
    async fn identities_do_not_share_quota() {
        let (_, engine) = engine_with(reference_policy(UpdateMode::Atomic));
        let noisy = ClientIdentity::new("1.2.3.4");
        let quiet = ClientIdentity::new("5.6.7.8");

        for _ in 0..12 {
            engine.decide_at(&noisy, NOW).await;
        }
        assert!(!engine.decide_at(&noisy, NOW).await.is_admitted());
        assert!(engine.decide_at(&quiet, NOW).await.is_admitted());
    }

    #[tokio::test]
    async fn expiry_is_set_only_at_creation() {
        let (store, engine) = engine_with(reference_policy(UpdateMode::ReadModifyWrite));
        let id = ClientIdentity::new("1.2.3.4");

        engine.decide_at(&id, NOW).await;
        engine.decide_at(&id, NOW + 1).await;
        engine.decide_at(&id, NOW + 2).await;

        assert_eq!(store.expire_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fail_open_admits_during_an_outage() {
        let (store, engine) = engine_with(reference_policy(UpdateMode::Atomic));
        store.set_down(true);

        let decision = engine.decide_at(&ClientIdentity::new("1.2.3.4"), NOW).await;
        assert_eq!(decision.verdict, Verdict::Admit);
        assert!(decision.fallback);
        assert_eq!(decision.count, None);
    }

    #[tokio::test]
    async fn fail_closed_rejects_during_an_outage() {
        let policy = LimiterPolicy {
            on_store_failure: FailurePolicy::FailClosed,
            ..LimiterPolicy::default()
        };
        let (store, engine) = engine_with(policy);
        store.set_down(true);

        let decision = engine.decide_at(&ClientIdentity::new("1.2.3.4"), NOW).await;
        assert_eq!(decision.verdict, Verdict::Reject(RejectReason::StoreUnavailable));
        assert!(decision.fallback);
    }

    #[tokio::test]
    async fn outage_recovery_restores_counting() {
        let (store, engine) = engine_with(reference_policy(UpdateMode::Atomic));
        store.set_down(true);
        assert!(engine.decide_at(&ClientIdentity::new("1.2.3.4"), NOW).await.fallback);

        store.set_down(false);
        let decision = engine.decide_at(&ClientIdentity::new("1.2.3.4"), NOW).await;
        assert!(!decision.fallback);
        assert_eq!(decision.count, Some(1));
    }

    #[tokio::test]
    async fn expiry_shorter_than_window_is_clamped() {
        let policy = LimiterPolicy {
            window: Duration::from_secs(60),
            expiry: Duration::from_secs(10),
            ..LimiterPolicy::default()
        };
        let (_, engine) = engine_with(policy);
        assert_eq!(engine.policy().expiry, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn retry_after_counts_down_to_the_window_boundary() {
        let (_, engine) = engine_with(reference_policy(UpdateMode::Atomic));
        let id = ClientIdentity::new("1.2.3.4");

        let at_start = engine.decide_at(&id, 1200).await;
        assert_eq!(at_start.retry_after, Duration::from_secs(60));

        let near_end = engine.decide_at(&id, 1259).await;
        assert_eq!(near_end.retry_after, Duration::from_secs(1));
    }
}
