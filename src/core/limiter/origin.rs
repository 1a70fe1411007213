// src/core/limiter/origin.rs

//! Derivation of the origin key used for rate accounting.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Identifies a subscriber's network origin. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OriginKey(Arc<str>);

impl OriginKey {
    /// Resolves the origin of a subscriber connection.
    ///
    /// A loopback peer is treated as a local reverse proxy when
    /// `trust_loopback_proxy` is set: the first `X-Forwarded-For` entry wins.
    pub fn resolve(
        peer: SocketAddr,
        forwarded_for: Option<&str>,
        trust_loopback_proxy: bool,
    ) -> Self {
        let ip = canonical_ip(peer.ip());
        if trust_loopback_proxy
            && ip.is_loopback()
            && let Some(client) = forwarded_for
                .and_then(|h| h.split(',').next())
                .map(str::trim)
                .filter(|s| !s.is_empty())
        {
            return match client.parse::<IpAddr>() {
                Ok(parsed) => Self::from(canonical_ip(parsed)),
                Err(_) => Self::from(client),
            };
        }
        Self::from(ip)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Folds IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) into plain IPv4.
fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}

impl From<IpAddr> for OriginKey {
    fn from(ip: IpAddr) -> Self {
        Self(Arc::from(ip.to_string()))
    }
}

impl From<&str> for OriginKey {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for OriginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
