//! # Gatekeep Core
//!
//! The domain layer of the Gatekeep admission filter.
//! This crate contains the rate-decision engine and pure domain logic with
//! zero infrastructure dependencies; the counter store is a port implemented
//! by `gatekeep-infra`.

pub mod domain;
pub mod engine;
pub mod ports;

pub use domain::{ClientIdentity, Decision, RejectReason, TimeBucket, Verdict};
pub use engine::{DecisionEngine, FailurePolicy, LimiterPolicy, UpdateMode};
