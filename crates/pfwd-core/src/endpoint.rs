//! Shared active endpoint.
//!
//! The single `ip:port` string currently used for new outbound dials.
//! Written by the domain refresher, read once per accepted connection by
//! the accept loop. A reader always observes a complete value.

use std::sync::Arc;

use tokio::sync::RwLock;

/// Cloneable handle to the currently active dial target.
#[derive(Debug, Clone)]
pub struct ActiveEndpoint {
    inner: Arc<RwLock<String>>,
}

impl ActiveEndpoint {
    pub fn new(endpoint: String) -> Self {
        Self {
            inner: Arc::new(RwLock::new(endpoint)),
        }
    }

    /// Snapshot the current endpoint.
    pub async fn get(&self) -> String {
        self.inner.read().await.clone()
    }

    /// Atomically replace the endpoint. Sessions already past their dial
    /// are unaffected.
    pub async fn set(&self, endpoint: String) {
        *self.inner.write().await = endpoint;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_replaces_value_for_later_readers() {
        let active = ActiveEndpoint::new("1.1.1.1:80".to_string());
        assert_eq!(active.get().await, "1.1.1.1:80");

        let writer = active.clone();
        writer.set("2.2.2.2:80".to_string()).await;
        assert_eq!(active.get().await, "2.2.2.2:80");
    }
}
