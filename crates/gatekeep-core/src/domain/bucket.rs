//! Fixed-window time buckets and counter key derivation.

use std::time::Duration;

use super::ClientIdentity;

/// Index of one fixed time window: `floor(unix_seconds / window_seconds)`.
///
/// Advances monotonically and is never reused meaningfully once past; the
/// store's own expiry reclaims old keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeBucket(i64);

impl TimeBucket {
    /// Bucket containing the given unix timestamp.
    ///
    /// Floor division, so a request at the exact window boundary lands in the
    /// new window. Hard cutoff, not a sliding window.
    pub fn at(now_unix: i64, window: Duration) -> Self {
        let window_secs = window.as_secs().max(1) as i64;
        Self(now_unix.div_euclid(window_secs))
    }

    pub fn index(&self) -> i64 {
        self.0
    }
}

/// Derive the store key for one client in one window: identity followed by
/// the bucket index. All timestamps inside the same window produce an
/// identical key.
pub fn bucket_key(identity: &ClientIdentity, bucket: TimeBucket) -> String {
    format!("{}{}", identity.as_str(), bucket.index())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn timestamps_in_same_window_share_a_key() {
        let id = ClientIdentity::new("1.2.3.4");
        let a = bucket_key(&id, TimeBucket::at(120, WINDOW));
        let b = bucket_key(&id, TimeBucket::at(179, WINDOW));
        assert_eq!(a, b);
    }

    #[test]
    fn boundary_instant_belongs_to_the_new_window() {
        assert_eq!(TimeBucket::at(119, WINDOW).index(), 1);
        assert_eq!(TimeBucket::at(120, WINDOW).index(), 2);
    }

    #[test]
    fn different_identities_never_collide_within_a_window() {
        let bucket = TimeBucket::at(1000, WINDOW);
        let a = bucket_key(&ClientIdentity::new("1.2.3.4"), bucket);
        let b = bucket_key(&ClientIdentity::new("5.6.7.8"), bucket);
        assert_ne!(a, b);
    }

    #[test]
    fn key_is_identity_concatenated_with_bucket_index() {
        let id = ClientIdentity::new("1.2.3.4");
        assert_eq!(bucket_key(&id, TimeBucket::at(120, WINDOW)), "1.2.3.42");
    }
}
