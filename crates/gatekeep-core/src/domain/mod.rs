//! Domain types for request admission.

mod bucket;
mod identity;
mod verdict;

pub use bucket::{TimeBucket, bucket_key};
pub use identity::{ClientIdentity, FORWARDED_FOR_HEADER, REAL_IP_HEADER, extract_identity};
pub use verdict::{Decision, RejectReason, Verdict};
