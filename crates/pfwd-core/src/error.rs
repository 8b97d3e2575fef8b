use thiserror::Error;

/// Errors produced by the forwarding engine.
///
/// Construction-time errors (`MalformedAddress`, `ResolutionFailed`,
/// `ListenFailed`) are returned synchronously to the caller. Runtime errors
/// are terminal for a single unit of work (one relay session, one refresh
/// tick) and are logged rather than propagated.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("malformed address {0:?}: expected host:port")]
    MalformedAddress(String),

    #[error("resolution failed for {host}: {source}")]
    ResolutionFailed {
        host: String,
        source: std::io::Error,
    },

    #[error("refresh lookup failed for {host}: {source}")]
    RefreshLookupFailed {
        host: String,
        source: std::io::Error,
    },

    #[error("listen on {addr} failed: {source}")]
    ListenFailed {
        addr: String,
        source: std::io::Error,
    },

    #[error("dial {target} failed: {source}")]
    DialFailed {
        target: String,
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ForwardResult<T> = Result<T, ForwardError>;
