//! Admission verdicts produced by the decision engine.

use std::time::Duration;

use serde::Serialize;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    /// Forward the request to the downstream handler.
    Admit,
    /// Short-circuit with a rejection response.
    Reject(RejectReason),
}

/// Why a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    /// The client exhausted its quota for the current window.
    ThresholdExceeded,
    /// The counter store was unreachable and the fail-closed policy applies.
    StoreUnavailable,
}

/// Full result of one admission check.
#[derive(Debug, Clone)]
pub struct Decision {
    pub verdict: Verdict,
    /// Counter value observed for this window, `None` when the store failed.
    pub count: Option<u64>,
    /// True when the verdict came from the store-failure policy rather than
    /// a counter read.
    pub fallback: bool,
    /// Time until the current window resets, suitable for a `Retry-After`
    /// header.
    pub retry_after: Duration,
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self.verdict, Verdict::Admit)
    }
}
