//! TCP reachability pre-checks with a shared result cache
//!
//! Probing a directory environment hits the same (host, port) pairs from
//! several probers. The first completed check wins and later callers get
//! the cached verdict, keeping concurrent scans from hammering closed
//! ports.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio::time::timeout;

/// Reachability check used by probers before committing to a protocol
/// exchange. Mockable in tests.
#[async_trait]
pub trait PortCheck: Send + Sync {
    async fn check_port(&self, host: &str, port: u16, op_timeout: Duration) -> bool;
}

/// Caching TCP connect scanner
#[derive(Default)]
pub struct PortScanner {
    cache: RwLock<HashMap<(String, u16), bool>>,
}

impl PortScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all cached verdicts
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    async fn connect(host: &str, port: u16, op_timeout: Duration) -> bool {
        matches!(
            timeout(op_timeout, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        )
    }
}

#[async_trait]
impl PortCheck for PortScanner {
    async fn check_port(&self, host: &str, port: u16, op_timeout: Duration) -> bool {
        let key = (host.to_string(), port);

        if let Some(&open) = self.cache.read().await.get(&key) {
            log::trace!("port cache hit for {}:{} -> {}", host, port, open);
            return open;
        }

        let open = Self::connect(host, port, op_timeout).await;

        // First writer wins so concurrent checks of the same endpoint
        // settle on one verdict
        let mut cache = self.cache.write().await;
        *cache.entry(key).or_insert(open)
    }
}
