//! The admin surface exposed to the management plane.
//!
//! Plain procedure calls over the core components; the REST layer, CLI,
//! and dashboard live outside this crate and call in through a cloned
//! `AdminHandle`. Reload and update clear the response cache on completion
//! so stale allowed answers never outlive a policy change.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::db::{BlockedQuery, Database};
use crate::filter::FilterEngine;
use crate::stats::StatsCollector;
use crate::upstream::UpstreamPool;

#[derive(Clone)]
pub struct AdminHandle {
    filter: Arc<FilterEngine>,
    cache: Arc<ResponseCache>,
    stats: Arc<StatsCollector>,
    upstreams: Arc<UpstreamPool>,
    db: Arc<Database>,
}

/// Counter snapshot plus the current blocklist size.
#[derive(Debug, Clone, Serialize)]
pub struct AdminStats {
    pub total_queries: u64,
    pub blocked_queries: u64,
    pub cached_responses: u64,
    pub uptime_seconds: u64,
    pub blocked_domain_count: usize,
}

impl AdminHandle {
    pub fn new(
        filter: Arc<FilterEngine>,
        cache: Arc<ResponseCache>,
        stats: Arc<StatsCollector>,
        upstreams: Arc<UpstreamPool>,
        db: Arc<Database>,
    ) -> Self {
        Self {
            filter,
            cache,
            stats,
            upstreams,
            db,
        }
    }

    pub fn stats(&self) -> AdminStats {
        let snapshot = self.stats.snapshot();
        AdminStats {
            total_queries: snapshot.total_queries,
            blocked_queries: snapshot.blocked_queries,
            cached_responses: snapshot.cached_responses,
            uptime_seconds: snapshot.uptime_seconds,
            blocked_domain_count: self.filter.blocked_count(),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        tracing::info!("DNS cache cleared");
    }

    /// Re-reads custom YAML lists, then invalidates the cache so the new
    /// entries take effect on the next query.
    pub fn reload_custom(&self) -> usize {
        let count = self.filter.reload_custom();
        self.clear_cache();
        count
    }

    /// Full blocklist refresh; long-running, callers start it
    /// asynchronously. The cache is cleared only on success.
    pub async fn update_all(&self) -> Result<()> {
        self.filter.update_all().await?;
        self.clear_cache();
        Ok(())
    }

    pub fn add_whitelist(&self, domain: &str) -> Result<()> {
        self.filter.add_whitelist(domain)
    }

    pub fn remove_whitelist(&self, domain: &str) -> Result<()> {
        self.filter.remove_whitelist(domain)
    }

    pub fn whitelist(&self) -> Vec<String> {
        self.filter.whitelist()
    }

    pub fn add_custom(&self, domain: &str) {
        self.filter.add_custom(domain);
    }

    pub fn remove_custom(&self, domain: &str) {
        self.filter.remove_custom(domain);
    }

    pub fn custom(&self) -> Vec<String> {
        self.filter.custom()
    }

    pub fn upstreams(&self) -> Vec<String> {
        self.upstreams.list()
    }

    pub fn add_upstream(&self, server: String) {
        self.upstreams.add(server);
    }

    pub fn remove_upstream(&self, server: &str) {
        self.upstreams.remove(server);
    }

    pub fn recent_blocked(&self, limit: usize) -> Result<Vec<BlockedQuery>> {
        self.db.recent_blocked(limit)
    }
}
