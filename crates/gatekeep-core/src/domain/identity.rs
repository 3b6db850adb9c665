//! Client identity extraction from request metadata.

use std::fmt;

/// Header set by a reverse proxy carrying the real client IP.
pub static REAL_IP_HEADER: &str = "X-Real-Ip";

/// Standard forwarded-for header, consulted when the real-IP header is absent.
pub static FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";

/// Opaque label identifying one client, typically an IP address.
///
/// No uniqueness is assumed beyond what the network provides.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve the client identity from request metadata, first match wins:
/// real-IP header, then forwarded-for header, then the raw connection address.
///
/// The connection address is always present, so this never fails.
pub fn extract_identity(
    real_ip: Option<&str>,
    forwarded_for: Option<&str>,
    remote_addr: &str,
) -> ClientIdentity {
    let value = real_ip
        .filter(|v| !v.is_empty())
        .or(forwarded_for.filter(|v| !v.is_empty()))
        .unwrap_or(remote_addr);

    ClientIdentity::new(value)
}
