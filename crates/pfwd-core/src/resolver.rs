//! Target address resolution via `tokio::net::lookup_host`.
//!
//! Turns a configured `host:port` spec into a routable `ip:port` endpoint,
//! distinguishing literal-IP targets (used as-is, never refreshed) from
//! domain-backed targets (resolved now, re-resolved periodically by the
//! [`refresher`](crate::refresher)).

use std::net::{IpAddr, SocketAddr};

use tokio::net;
use tracing::debug;

use crate::error::{ForwardError, ForwardResult};

/// Outcome of resolving a remote target spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Routable `ip:port` endpoint usable for dialing.
    pub endpoint: String,
    /// Original `host:port` template, retained for re-resolution.
    /// `None` when the spec was a literal IP.
    pub domain: Option<String>,
}

/// Split a spec into `(host, port)`.
///
/// The spec must split on `':'` into exactly two parts; anything else
/// (no colon, or a bracketless IPv6 literal) is rejected before any
/// network call is made.
pub(crate) fn split_host_port(spec: &str) -> ForwardResult<(&str, &str)> {
    let mut parts = spec.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(host), Some(port), None) if !host.is_empty() && !port.is_empty() => {
            Ok((host, port))
        }
        _ => Err(ForwardError::MalformedAddress(spec.to_string())),
    }
}

/// Resolve a remote spec to a dialable endpoint.
///
/// Literal IPs pass through unchanged with no lookup. Domain names are
/// resolved once; the first returned address wins. A failed lookup is a
/// hard error: the forwarder never starts from a spec it cannot resolve.
pub async fn resolve_target(spec: &str) -> ForwardResult<ResolvedTarget> {
    let (host, port) = split_host_port(spec)?;

    if host.parse::<IpAddr>().is_ok() {
        return Ok(ResolvedTarget {
            endpoint: spec.to_string(),
            domain: None,
        });
    }

    let port: u16 = port
        .parse()
        .map_err(|_| ForwardError::MalformedAddress(spec.to_string()))?;
    let ip = lookup_first_ip(host).await.map_err(|source| {
        ForwardError::ResolutionFailed {
            host: host.to_string(),
            source,
        }
    })?;
    debug!(host, ip = %ip, "resolved target");

    Ok(ResolvedTarget {
        // SocketAddr formatting keeps IPv6 results dialable ([::1]:80).
        endpoint: SocketAddr::new(ip, port).to_string(),
        domain: Some(spec.to_string()),
    })
}

/// Look up a hostname and return the first resolved IP.
///
/// A dummy port is appended because `lookup_host` requires a `host:port`
/// pair.
pub(crate) async fn lookup_first_ip(host: &str) -> std::io::Result<IpAddr> {
    let mut addrs = net::lookup_host(format!("{host}:0")).await?;
    addrs.next().map(|a| a.ip()).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no addresses found for {host}"),
        )
    })
}
