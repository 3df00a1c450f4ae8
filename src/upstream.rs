//! Upstream resolver pool with round-robin selection.
//!
//! `next()` distributes load across concurrent callers through an atomic
//! counter that is independent of the server-list lock. `forward` relays
//! query bytes verbatim over UDP and returns the raw reply, so EDNS0 and
//! any upstream flags pass through untouched.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

const DEFAULT_UPSTREAM: &str = "8.8.8.8:53";
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

// Large enough for EDNS0-advertised payloads.
const MAX_RESPONSE_SIZE: usize = 4096;

/// Abstract upstream exchange so the pipeline can be driven by a mock.
#[async_trait::async_trait]
pub trait UpstreamExchange: Send + Sync {
    /// Sends the query bytes to an upstream and returns the reply bytes.
    async fn forward(&self, query: &[u8]) -> Result<Vec<u8>>;
}

pub struct UpstreamPool {
    servers: RwLock<Vec<String>>,
    index: AtomicUsize,
}

impl UpstreamPool {
    pub fn new(servers: Vec<String>) -> Self {
        let servers = if servers.is_empty() {
            vec![DEFAULT_UPSTREAM.to_string()]
        } else {
            servers
        };
        Self {
            servers: RwLock::new(servers),
            index: AtomicUsize::new(0),
        }
    }

    /// Returns the next upstream server, round-robin.
    pub fn next(&self) -> String {
        let servers = self.servers.read().unwrap();
        if servers.is_empty() {
            return DEFAULT_UPSTREAM.to_string();
        }
        if servers.len() == 1 {
            return servers[0].clone();
        }
        let idx = self.index.fetch_add(1, Ordering::Relaxed);
        servers[idx % servers.len()].clone()
    }

    pub fn add(&self, server: String) {
        let mut servers = self.servers.write().unwrap();
        servers.push(server);
    }

    pub fn remove(&self, server: &str) {
        let mut servers = self.servers.write().unwrap();
        if let Some(pos) = servers.iter().position(|s| s == server) {
            servers.remove(pos);
        }
    }

    pub fn list(&self) -> Vec<String> {
        self.servers.read().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl UpstreamExchange for UpstreamPool {
    async fn forward(&self, query: &[u8]) -> Result<Vec<u8>> {
        let upstream = self.next();

        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("Failed to bind upstream socket")?;
        socket
            .send_to(query, &upstream)
            .await
            .with_context(|| format!("Failed to send query to {upstream}"))?;

        let mut buf = [0u8; MAX_RESPONSE_SIZE];
        let (len, _) = timeout(EXCHANGE_TIMEOUT, socket.recv_from(&mut buf))
            .await
            .with_context(|| format!("Upstream {upstream} timed out"))?
            .with_context(|| format!("Failed to receive from {upstream}"))?;

        Ok(buf[..len].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    #[test]
    fn test_empty_pool_uses_default() {
        let pool = UpstreamPool::new(vec![]);
        assert_eq!(pool.next(), DEFAULT_UPSTREAM);
        assert_eq!(pool.list(), vec![DEFAULT_UPSTREAM.to_string()]);
    }

    #[test]
    fn test_round_robin_fairness() {
        let servers = vec![
            "1.1.1.1:53".to_string(),
            "8.8.8.8:53".to_string(),
            "9.9.9.9:53".to_string(),
        ];
        let pool = UpstreamPool::new(servers.clone());

        let mut counts: FxHashMap<String, usize> = FxHashMap::default();
        for _ in 0..servers.len() * 7 {
            *counts.entry(pool.next()).or_default() += 1;
        }
        for server in &servers {
            assert_eq!(counts[server], 7, "uneven distribution for {server}");
        }
    }

    #[test]
    fn test_add_remove_list() {
        let pool = UpstreamPool::new(vec!["1.1.1.1:53".to_string()]);
        pool.add("9.9.9.9:53".to_string());
        assert_eq!(pool.list().len(), 2);

        pool.remove("1.1.1.1:53");
        assert_eq!(pool.list(), vec!["9.9.9.9:53".to_string()]);

        pool.remove("not-there:53");
        assert_eq!(pool.list().len(), 1);
    }
}
