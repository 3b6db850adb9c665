//! # Gatekeep Shared
//!
//! Response types shared between the server boundary and any clients.

pub mod response;

pub use response::{ApiResponse, ErrorResponse};
