//! pfwd-core: TCP port forwarding engine.
//!
//! Accepts connections on a local address and relays their byte stream,
//! unmodified and bidirectionally, to a configured remote target. Targets
//! given as domain names are resolved once at construction and re-resolved
//! periodically so long-lived forwarders follow DNS record rotation.
//!
//! The relay is transparent: no framing, no handshake, no protocol of its
//! own.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod forwarder;
mod refresher;
pub mod relay;
pub mod resolver;

// Re-export commonly used items at crate root.
pub use config::{ForwarderConfig, DEFAULT_IDLE_TIMEOUT, DEFAULT_REFRESH_INTERVAL};
pub use endpoint::ActiveEndpoint;
pub use error::{ForwardError, ForwardResult};
pub use forwarder::Forwarder;
pub use relay::SessionCounter;
pub use resolver::{resolve_target, ResolvedTarget};
