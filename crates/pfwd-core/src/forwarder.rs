//! The forwarder: listener lifecycle and accept loop.
//!
//! Owns the shared active endpoint, the session counter, and the shutdown
//! broadcast. `start()` binds the local listener and spawns the accept loop
//! (plus the domain refresher for domain-backed targets), then returns
//! immediately. `stop()` fires the shutdown signal once: the accept loop
//! and refresher exit, while in-flight sessions drain naturally via idle
//! timeout or peer closure.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::ForwarderConfig;
use crate::endpoint::ActiveEndpoint;
use crate::error::{ForwardError, ForwardResult};
use crate::refresher;
use crate::relay::{self, SessionCounter};
use crate::resolver;

/// A running (or startable) TCP port forwarder.
pub struct Forwarder {
    config: ForwarderConfig,
    /// Current dial target, swapped by the refresher for domain targets.
    active: ActiveEndpoint,
    /// Original `host:port` template, `None` for literal-IP targets.
    domain: Option<String>,
    sessions: SessionCounter,
    shutdown_tx: broadcast::Sender<()>,
    stopped: AtomicBool,
}

impl Forwarder {
    /// Resolve the remote target and build a forwarder.
    ///
    /// Performs one DNS lookup when the target is a domain; a malformed
    /// spec or failed lookup is a hard error and nothing starts.
    pub async fn new(config: ForwarderConfig) -> ForwardResult<Self> {
        let target = resolver::resolve_target(&config.remote_addr).await?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            active: ActiveEndpoint::new(target.endpoint),
            domain: target.domain,
            sessions: SessionCounter::new(),
            shutdown_tx,
            stopped: AtomicBool::new(false),
            config,
        })
    }

    /// Bind the local listener and launch the background tasks.
    ///
    /// Non-blocking: returns the bound local address as soon as the accept
    /// loop (and, for domain targets, the refresh loop) is spawned. A bind
    /// failure returns [`ForwardError::ListenFailed`] and spawns nothing.
    pub async fn start(&self) -> ForwardResult<SocketAddr> {
        let listener = TcpListener::bind(&self.config.local_addr)
            .await
            .map_err(|source| ForwardError::ListenFailed {
                addr: self.config.local_addr.clone(),
                source,
            })?;
        let local = listener.local_addr()?;

        if let Some(domain) = self.domain.clone() {
            refresher::spawn(
                domain,
                self.active.clone(),
                self.config.refresh_interval,
                self.shutdown_tx.subscribe(),
            );
        }

        let active = self.active.clone();
        let sessions = self.sessions.clone();
        let idle_timeout = self.config.idle_timeout;
        let shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(accept_loop(listener, active, sessions, idle_timeout, shutdown));

        info!(
            local = %local,
            remote = %self.config.remote_addr,
            "forwarding started"
        );
        Ok(local)
    }

    /// Fire the shutdown signal (once) and return immediately.
    ///
    /// Does not wait for in-flight sessions to drain.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("forwarder stopping");
        let _ = self.shutdown_tx.send(());
    }

    /// Endpoint new sessions would currently dial.
    pub async fn active_endpoint(&self) -> String {
        self.active.get().await
    }

    /// Number of relay sessions currently live.
    pub fn live_sessions(&self) -> usize {
        self.sessions.count()
    }
}

/// Accept connections until the shutdown signal fires.
///
/// Each accepted connection snapshots the active endpoint and becomes a
/// detached session task; accepting never waits on session completion.
/// Transient accept errors are logged and the loop keeps going.
async fn accept_loop(
    listener: TcpListener,
    active: ActiveEndpoint,
    sessions: SessionCounter,
    idle_timeout: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("accept loop stopped");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok((inbound, peer)) => {
                    let target = active.get().await;
                    debug!(%peer, %target, live = sessions.count(), "accepted connection");
                    tokio::spawn(relay::run(
                        inbound,
                        peer,
                        target,
                        idle_timeout,
                        sessions.clone(),
                    ));
                }
                Err(e) => warn!(error = %e, "accept error"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    /// Echo server bound to the given address spec; returns its address.
    async fn spawn_echo_server(bind: &str) -> SocketAddr {
        let listener = TcpListener::bind(bind).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    loop {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => {
                                if stream.write_all(&buf[..n]).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                });
            }
        });
        addr
    }

    async fn roundtrip(stream: &mut TcpStream, payload: &[u8]) {
        stream.write_all(payload).await.unwrap();
        let mut reply = vec![0u8; payload.len()];
        timeout(Duration::from_secs(2), stream.read_exact(&mut reply))
            .await
            .expect("echo reply should arrive")
            .unwrap();
        assert_eq!(reply, payload);
    }

    #[tokio::test]
    async fn relays_end_to_end_with_literal_ip_target() {
        let echo = spawn_echo_server("127.0.0.1:0").await;
        let fwd = Forwarder::new(ForwarderConfig::new("127.0.0.1:0", echo.to_string()))
            .await
            .unwrap();
        assert_eq!(fwd.active_endpoint().await, echo.to_string());

        let local = fwd.start().await.unwrap();
        let mut client = TcpStream::connect(local).await.unwrap();
        roundtrip(&mut client, b"ping").await;

        fwd.stop();
    }

    #[tokio::test]
    async fn relays_end_to_end_with_domain_target() {
        // Bind the echo server through the same name so the resolved
        // endpoint matches whichever address localhost maps to first.
        let echo = spawn_echo_server("localhost:0").await;
        let remote = format!("localhost:{}", echo.port());

        let fwd = Forwarder::new(ForwarderConfig::new("127.0.0.1:0", remote))
            .await
            .unwrap();
        assert!(fwd.domain.is_some());
        assert!(fwd.active_endpoint().await.ends_with(&echo.port().to_string()));

        let local = fwd.start().await.unwrap();
        let mut client = TcpStream::connect(local).await.unwrap();
        roundtrip(&mut client, b"ping").await;

        fwd.stop();
    }

    #[tokio::test]
    async fn bind_failure_is_listen_failed() {
        let echo = spawn_echo_server("127.0.0.1:0").await;
        // Occupy a port, then ask the forwarder to bind the same one.
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let fwd = Forwarder::new(ForwarderConfig::new(addr, echo.to_string()))
            .await
            .unwrap();
        let err = fwd.start().await.unwrap_err();
        assert!(matches!(err, ForwardError::ListenFailed { .. }));
    }

    #[tokio::test]
    async fn dial_failure_aborts_one_session_not_the_forwarder() {
        // Bind then drop to get a target port with no listener.
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = dead.local_addr().unwrap().to_string();
        drop(dead);

        let fwd = Forwarder::new(ForwarderConfig::new("127.0.0.1:0", target))
            .await
            .unwrap();
        let local = fwd.start().await.unwrap();

        // First session aborts at dial; its inbound connection is closed.
        let mut first = TcpStream::connect(local).await.unwrap();
        let mut buf = [0u8; 1];
        let read = timeout(Duration::from_secs(2), first.read(&mut buf))
            .await
            .expect("first client should be disconnected");
        assert!(matches!(read, Ok(0) | Err(_)), "got {read:?}");

        // The accept loop is still alive for further connections.
        TcpStream::connect(local)
            .await
            .expect("forwarder should keep accepting");

        fwd.stop();
    }

    #[tokio::test]
    async fn stop_halts_accepting_while_active_session_drains() {
        let echo = spawn_echo_server("127.0.0.1:0").await;
        let fwd = Forwarder::new(ForwarderConfig::new("127.0.0.1:0", echo.to_string()))
            .await
            .unwrap();
        let local = fwd.start().await.unwrap();

        let mut client = TcpStream::connect(local).await.unwrap();
        roundtrip(&mut client, b"before stop").await;

        fwd.stop();
        fwd.stop(); // idempotent

        // The listener goes away within bounded time.
        let refused = timeout(Duration::from_secs(2), async {
            loop {
                if TcpStream::connect(local).await.is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        assert!(refused.is_ok(), "accept loop should stop accepting");

        // The in-flight session keeps relaying past stop().
        roundtrip(&mut client, b"after stop").await;
    }

    #[tokio::test]
    async fn swapped_endpoint_applies_to_new_sessions_only() {
        let first_echo = spawn_echo_server("127.0.0.1:0").await;
        let fwd = Forwarder::new(ForwarderConfig::new("127.0.0.1:0", first_echo.to_string()))
            .await
            .unwrap();
        let local = fwd.start().await.unwrap();

        let mut old_session = TcpStream::connect(local).await.unwrap();
        roundtrip(&mut old_session, b"old").await;

        // Simulate a refresh swap: new sessions dial a different target,
        // one that greets with a banner instead of echoing.
        let banner = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let banner_addr = banner.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = banner.accept().await {
                tokio::spawn(async move {
                    let _ = stream.write_all(b"second").await;
                    let mut sink = vec![0u8; 1024];
                    while matches!(stream.read(&mut sink).await, Ok(n) if n > 0) {}
                });
            }
        });
        fwd.active.set(banner_addr.to_string()).await;

        let mut new_session = TcpStream::connect(local).await.unwrap();
        let mut greeting = [0u8; 6];
        timeout(Duration::from_secs(2), new_session.read_exact(&mut greeting))
            .await
            .expect("banner should arrive via the relay")
            .unwrap();
        assert_eq!(&greeting, b"second");

        // The pre-swap session still talks to its original target.
        roundtrip(&mut old_session, b"old again").await;

        fwd.stop();
    }
}
