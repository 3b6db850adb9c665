//! Middleware modules.

pub mod admission;

pub use admission::AdmissionFilter;
