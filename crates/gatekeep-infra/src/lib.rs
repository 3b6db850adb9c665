//! # Gatekeep Infrastructure
//!
//! Concrete implementations of the `CounterStore` port defined in
//! `gatekeep-core`.
//!
//! ## Feature Flags
//!
//! - `redis` (default) - Redis-backed counter store
//! - without `redis` - in-memory store only

pub mod counter_store;

pub use counter_store::InMemoryCounterStore;

#[cfg(feature = "redis")]
pub use counter_store::{RedisCounterStore, RedisStoreConfig};
