//! Bootstrap DNS for the blocklist HTTP client.
//!
//! The fetcher must never resolve source hostnames through the filter
//! itself, or the first update on a clean install deadlocks behind an
//! empty blocklist. This resolver answers reqwest's lookups with a direct
//! UDP query to the configured bootstrap servers.

use anyhow::{bail, Context, Result};
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RData, RecordType};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

static QUERY_ID: AtomicU16 = AtomicU16::new(1);

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct BootstrapResolver {
    servers: Vec<String>,
}

impl BootstrapResolver {
    pub fn new(servers: Vec<String>) -> Self {
        Self { servers }
    }
}

impl reqwest::dns::Resolve for BootstrapResolver {
    fn resolve(&self, name: reqwest::dns::Name) -> reqwest::dns::Resolving {
        let servers = self.servers.clone();
        let host = name.as_str().to_string();
        Box::pin(async move {
            let addrs = lookup(&servers, &host).await?;
            // reqwest substitutes the URL port itself
            let iter = addrs.into_iter().map(|ip| SocketAddr::new(ip, 0));
            Ok(Box::new(iter) as reqwest::dns::Addrs)
        })
    }
}

async fn lookup(servers: &[String], host: &str) -> Result<Vec<IpAddr>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }

    let query = build_query(host)?;
    let mut last_err = anyhow::anyhow!("No bootstrap DNS servers configured");

    for server in servers {
        match exchange(&query, server).await {
            Ok(ips) if !ips.is_empty() => {
                debug!("Bootstrapped {} via {}: {:?}", host, server, ips);
                return Ok(ips);
            }
            Ok(_) => last_err = anyhow::anyhow!("{server} returned no addresses for {host}"),
            Err(e) => last_err = e,
        }
    }

    Err(last_err.context(format!("Bootstrap lookup failed for {host}")))
}

fn build_query(host: &str) -> Result<Vec<u8>> {
    let name = Name::from_ascii(host).context("Invalid hostname")?;
    let mut message = Message::new();
    message
        .set_id(QUERY_ID.fetch_add(1, Ordering::Relaxed))
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    message.add_query(Query::query(name, RecordType::A));
    message.to_vec().context("Failed to encode bootstrap query")
}

async fn exchange(query: &[u8], server: &str) -> Result<Vec<IpAddr>> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("Failed to bind bootstrap socket")?;
    socket
        .send_to(query, server)
        .await
        .with_context(|| format!("Failed to reach bootstrap server {server}"))?;

    let mut buf = [0u8; 512];
    let (len, _) = timeout(LOOKUP_TIMEOUT, socket.recv_from(&mut buf))
        .await
        .with_context(|| format!("Bootstrap server {server} timed out"))?
        .with_context(|| format!("Failed to receive from {server}"))?;

    let response = Message::from_vec(&buf[..len]).context("Unparseable bootstrap response")?;
    if response.response_code() != hickory_proto::op::ResponseCode::NoError {
        bail!("Bootstrap server {server} answered {}", response.response_code());
    }

    let ips = response
        .answers()
        .iter()
        .filter_map(|record| match record.data() {
            Some(RData::A(a)) => Some(IpAddr::V4(a.0)),
            Some(RData::AAAA(aaaa)) => Some(IpAddr::V6(aaaa.0)),
            _ => None,
        })
        .collect();
    Ok(ips)
}
