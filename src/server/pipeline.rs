//! Per-query orchestration: cache, filter, upstream.
//!
//! The pipeline is the only component that mutates statistics and writes
//! to the cache. Every decoded query yields exactly one reply; upstream
//! failures surface as SERVFAIL rather than errors.

use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::RecordType;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::db::{unix_now, Database};
use crate::filter::{normalize_domain, FilterEngine};
use crate::logger::{QueryLogAction, QueryLogEntry, QueryLogger};
use crate::server::answer;
use crate::stats::StatsCollector;
use crate::upstream::UpstreamExchange;

pub struct Pipeline {
    config: Config,
    filter: Arc<FilterEngine>,
    cache: Arc<ResponseCache>,
    upstream: Arc<dyn UpstreamExchange>,
    stats: Arc<StatsCollector>,
    logger: Arc<QueryLogger>,
    db: Arc<Database>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        filter: Arc<FilterEngine>,
        cache: Arc<ResponseCache>,
        upstream: Arc<dyn UpstreamExchange>,
        stats: Arc<StatsCollector>,
        logger: Arc<QueryLogger>,
        db: Arc<Database>,
    ) -> Self {
        Self {
            config,
            filter,
            cache,
            upstream,
            stats,
            logger,
            db,
        }
    }

    /// Produces the reply bytes for one decoded query. `raw` is the
    /// original datagram, relayed verbatim on the forward path.
    pub async fn handle(&self, query: &Message, raw: &[u8], client: SocketAddr) -> Vec<u8> {
        self.stats.inc_queries();
        let start = Instant::now();

        let Some(question) = query.queries().first() else {
            return encode(answer::empty_reply(query));
        };

        let name = normalize_domain(&question.name().to_string());
        let qtype = question.query_type();

        if self.config.logging.log_queries {
            debug!(
                "DNS query: {} from {} (type: {})",
                name,
                client.ip(),
                qtype
            );
        }

        if let Some(mut cached) = self.cache.get(&name, qtype) {
            self.stats.inc_cached();
            // The stored reply is shared content; only this copy gets the
            // caller's transaction ID.
            cached[0..2].copy_from_slice(&query.id().to_be_bytes());
            self.log_query(client, &name, qtype, QueryLogAction::Cached, start);
            return cached;
        }

        if self.config.filtering.enabled && self.filter.should_block(&name) {
            return self.handle_blocked(query, client, &name, qtype, start);
        }

        self.forward_upstream(query, raw, client, &name, qtype, start)
            .await
    }

    fn handle_blocked(
        &self,
        query: &Message,
        client: SocketAddr,
        name: &str,
        qtype: RecordType,
        start: Instant,
    ) -> Vec<u8> {
        self.stats.inc_blocked();
        info!("BLOCKED: {} from {}", name, client.ip());

        if let Err(e) = self
            .db
            .log_blocked_query(name, &client.ip().to_string(), unix_now())
        {
            error!("Failed to persist block event for {}: {:#}", name, e);
        }
        self.log_query(client, name, qtype, QueryLogAction::Blocked, start);

        encode(answer::blocked_answer(
            query,
            self.config.filtering.block_action,
            &self.config.filtering.redirect_ip,
        ))
    }

    async fn forward_upstream(
        &self,
        query: &Message,
        raw: &[u8],
        client: SocketAddr,
        name: &str,
        qtype: RecordType,
        start: Instant,
    ) -> Vec<u8> {
        match self.upstream.forward(raw).await {
            Ok(response_bytes) => {
                if let Ok(response) = Message::from_vec(&response_bytes) {
                    if response.response_code() == ResponseCode::NoError
                        && !response.answers().is_empty()
                    {
                        self.cache.insert(name, qtype, &response_bytes);
                    }
                }
                self.log_query(client, name, qtype, QueryLogAction::Forwarded, start);
                response_bytes
            }
            Err(e) => {
                error!("Failed to forward query for {}: {:#}", name, e);
                self.log_query(client, name, qtype, QueryLogAction::Failed, start);
                encode(answer::servfail(query))
            }
        }
    }

    fn log_query(
        &self,
        client: SocketAddr,
        name: &str,
        qtype: RecordType,
        action: QueryLogAction,
        start: Instant,
    ) {
        self.logger.log(QueryLogEntry {
            client_ip: client.ip(),
            domain: name.into(),
            query_type: qtype,
            action,
            latency_ms: start.elapsed().as_millis() as u64,
        });
    }
}

fn encode(message: Message) -> Vec<u8> {
    // Encoding a locally built reply only fails on pathological label
    // lengths already rejected at decode time.
    message.to_vec().unwrap_or_default()
}
