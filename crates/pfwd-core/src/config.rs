//! Forwarder configuration.

use std::time::Duration;

/// How long a relay leg may sit idle (no successful read) before the
/// session is torn down.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15);

/// How often a domain-backed target is re-resolved.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Immutable configuration for a [`Forwarder`](crate::Forwarder).
///
/// `remote_addr` may be a literal `ip:port` or a `domain:port`; domain-backed
/// targets are periodically re-resolved while the forwarder runs.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Local bind address, e.g. `0.0.0.0:8080`.
    pub local_addr: String,
    /// Remote target, e.g. `1.1.1.1:80` or `example.com:80`.
    pub remote_addr: String,
    /// Per-leg read idle deadline.
    pub idle_timeout: Duration,
    /// Re-resolution period for domain-backed targets.
    pub refresh_interval: Duration,
}

impl ForwarderConfig {
    /// Build a config with the default idle timeout and refresh interval.
    pub fn new(local_addr: impl Into<String>, remote_addr: impl Into<String>) -> Self {
        Self {
            local_addr: local_addr.into(),
            remote_addr: remote_addr.into(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}
