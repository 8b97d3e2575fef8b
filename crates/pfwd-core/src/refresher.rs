//! Periodic re-resolution of domain-backed targets.
//!
//! Long-lived forwarders pointed at a domain must follow DNS record
//! rotation without a restart. The refresher re-resolves the original
//! `host:port` template on a fixed period and swaps the active endpoint
//! when the first returned address changes. Only new sessions see the
//! swap; in-flight sessions keep their dialed connection.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::endpoint::ActiveEndpoint;
use crate::error::{ForwardError, ForwardResult};
use crate::resolver;

/// Spawn the refresh loop for a domain-backed target.
///
/// Runs until the shutdown signal fires. Lookup failures are logged and
/// skipped; the timer is never restarted early.
pub(crate) fn spawn(
    domain: String,
    active: ActiveEndpoint,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!(%domain, "refresh loop stopped");
                    return;
                }
                _ = sleep(period) => {}
            }
            match refresh_once(&domain, &active).await {
                Ok(Some(endpoint)) => {
                    info!(%domain, %endpoint, "active endpoint updated");
                }
                Ok(None) => {}
                Err(e) => warn!(%domain, error = %e, "refresh failed, keeping current endpoint"),
            }
        }
    })
}

/// One refresh tick: re-resolve the domain and swap the active endpoint
/// if the first returned address changed. Returns the new endpoint when
/// a swap happened.
pub(crate) async fn refresh_once(
    domain: &str,
    active: &ActiveEndpoint,
) -> ForwardResult<Option<String>> {
    let (host, port) = resolver::split_host_port(domain)?;
    let port: u16 = port
        .parse()
        .map_err(|_| ForwardError::MalformedAddress(domain.to_string()))?;
    let ip = resolver::lookup_first_ip(host)
        .await
        .map_err(|source| ForwardError::RefreshLookupFailed {
            host: host.to_string(),
            source,
        })?;

    // The port never changes, so whole-endpoint equality is an address
    // comparison.
    let endpoint = std::net::SocketAddr::new(ip, port).to_string();
    if endpoint == active.get().await {
        return Ok(None);
    }

    active.set(endpoint.clone()).await;
    Ok(Some(endpoint))
}
