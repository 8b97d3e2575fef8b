//! Relay session: one inbound connection paired with one outbound dial,
//! copied bidirectionally until either leg ends.
//!
//! Each session dials the active endpoint once, then runs two spawned copy
//! tasks (inbound→remote and remote→inbound). A direction terminates on
//! EOF, read/write error, or idle-timeout expiry. Whichever direction ends
//! first sets the shared closing flag and fires a single-shot close signal
//! so the peer direction unblocks promptly; the session is done when both
//! tasks have been joined, at which point both sockets are released.
//!
//! Sessions are fire-and-forget: no error here reaches the accept loop.
//! There is deliberately no cap on concurrent sessions; the counter exists
//! so one could be added later.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{ForwardError, ForwardResult};

/// Per-read copy buffer, sized to fit a typical Ethernet MTU minus
/// TCP/IP headers so one read never fragments on the wire.
const COPY_BUFFER_SIZE: usize = 1460;

/// Counts live relay sessions (dialing included).
#[derive(Debug, Clone, Default)]
pub struct SessionCounter {
    live: Arc<AtomicUsize>,
}

impl SessionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of live sessions.
    pub fn count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> SessionGuard {
        self.live.fetch_add(1, Ordering::SeqCst);
        SessionGuard {
            live: self.live.clone(),
        }
    }
}

/// Decrements the live-session count when the session ends.
struct SessionGuard {
    live: Arc<AtomicUsize>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Run one relay session to completion (spawned per accepted connection).
pub(crate) async fn run(
    inbound: TcpStream,
    peer: SocketAddr,
    target: String,
    idle_timeout: Duration,
    counter: SessionCounter,
) {
    let _guard = counter.acquire();
    match relay(inbound, &target, idle_timeout).await {
        Ok(()) => debug!(%peer, %target, "session finished"),
        Err(e) => warn!(%peer, error = %e, "session aborted"),
    }
}

/// Dial the target and copy bytes both ways until either leg terminates.
///
/// Dial failure aborts the session and drops (closes) the inbound
/// connection; there is no retry.
async fn relay(inbound: TcpStream, target: &str, idle_timeout: Duration) -> ForwardResult<()> {
    let outbound =
        TcpStream::connect(target)
            .await
            .map_err(|source| ForwardError::DialFailed {
                target: target.to_string(),
                source,
            })?;

    let (inbound_read, inbound_write) = inbound.into_split();
    let (outbound_read, outbound_write) = outbound.into_split();

    let closing = Arc::new(AtomicBool::new(false));
    let (close_tx, close_rx) = broadcast::channel::<()>(1);

    let upstream = tokio::spawn(copy_direction(
        inbound_read,
        outbound_write,
        closing.clone(),
        close_tx.clone(),
        close_rx,
        idle_timeout,
        "inbound->remote",
    ));
    let downstream = tokio::spawn(copy_direction(
        outbound_read,
        inbound_write,
        closing,
        close_tx.clone(),
        close_tx.subscribe(),
        idle_timeout,
        "remote->inbound",
    ));

    // Both directions must terminate before the session is done.
    let _ = tokio::join!(upstream, downstream);
    Ok(())
}

/// One copy direction: read with an idle deadline, write through verbatim.
///
/// Terminates on EOF, idle expiry, IO error, or the session close signal.
/// On the way out it marks the session closing and fires the close signal
/// so the peer direction stops too; errors observed after the closing flag
/// is set are expected teardown fallout and are not reported.
async fn copy_direction(
    mut src: OwnedReadHalf,
    mut dst: OwnedWriteHalf,
    closing: Arc<AtomicBool>,
    close_tx: broadcast::Sender<()>,
    mut close_rx: broadcast::Receiver<()>,
    idle_timeout: Duration,
    direction: &'static str,
) {
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];

    loop {
        // Each successful read renews the idle deadline.
        let n = tokio::select! {
            _ = close_rx.recv() => break,
            read = timeout(idle_timeout, src.read(&mut buf)) => match read {
                Ok(Ok(0)) => {
                    debug!(direction, "peer closed");
                    break;
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    if !closing.load(Ordering::SeqCst) {
                        warn!(direction, error = %e, "read error");
                    }
                    break;
                }
                Err(_) => {
                    debug!(direction, "idle timeout");
                    break;
                }
            },
        };

        let written = tokio::select! {
            _ = close_rx.recv() => break,
            res = dst.write_all(&buf[..n]) => res,
        };
        if let Err(e) = written {
            if !closing.load(Ordering::SeqCst) {
                warn!(direction, error = %e, "write error");
            }
            break;
        }
    }

    closing.store(true, Ordering::SeqCst);
    let _ = close_tx.send(());
    let _ = dst.shutdown().await;
}
