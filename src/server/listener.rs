//! UDP listener and dispatch.
//!
//! One accept loop reads datagrams and hands each to its own worker task,
//! so slow upstream exchanges never stall the socket. Decode failures are
//! answered inline with a minimal reply and dropped. Shutdown stops the
//! accept loop, then gives in-flight workers a bounded grace before the
//! socket is abandoned.

use anyhow::{Context, Result};
use hickory_proto::op::Message;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::server::answer;
use crate::server::pipeline::Pipeline;

const MAX_DATAGRAM: usize = 4096;
const DNS_HEADER_LEN: usize = 12;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct DnsServer {
    socket: Arc<UdpSocket>,
    pipeline: Arc<Pipeline>,
    in_flight: Arc<AtomicUsize>,
}

impl DnsServer {
    pub async fn bind(host: &str, port: u16, pipeline: Arc<Pipeline>) -> Result<Self> {
        let socket = UdpSocket::bind((host, port))
            .await
            .with_context(|| format!("Failed to bind UDP {host}:{port}"))?;
        info!("DNS server listening on {}", socket.local_addr()?);

        Ok(Self {
            socket: Arc::new(socket),
            pipeline,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Runs the accept loop until `shutdown` fires, then waits out the
    /// grace period for in-flight workers. Stragglers are abandoned.
    pub async fn serve(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut buf = [0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    let (len, peer) = match received {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!("UDP receive error: {}", e);
                            continue;
                        }
                    };
                    self.dispatch(buf[..len].to_vec(), peer).await;
                }
                _ = shutdown.changed() => {
                    info!("Shutting down DNS server...");
                    break;
                }
            }
        }

        self.await_workers().await;
        Ok(())
    }

    async fn dispatch(&self, packet: Vec<u8>, peer: std::net::SocketAddr) {
        let query = match Message::from_vec(&packet) {
            Ok(query) => query,
            Err(e) => {
                debug!("Malformed datagram from {}: {}", peer, e);
                if packet.len() >= DNS_HEADER_LEN {
                    let id = u16::from_be_bytes([packet[0], packet[1]]);
                    if let Ok(reply) = answer::header_only_reply(id).to_vec() {
                        let _ = self.socket.send_to(&reply, peer).await;
                    }
                }
                return;
            }
        };

        let socket = Arc::clone(&self.socket);
        let pipeline = Arc::clone(&self.pipeline);
        let in_flight = Arc::clone(&self.in_flight);

        in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let response = pipeline.handle(&query, &packet, peer).await;
            if !response.is_empty() {
                if let Err(e) = socket.send_to(&response, peer).await {
                    warn!("Failed to send response to {}: {}", peer, e);
                }
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    async fn await_workers(&self) {
        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    "Abandoning {} in-flight queries after shutdown grace",
                    self.in_flight.load(Ordering::SeqCst)
                );
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}
