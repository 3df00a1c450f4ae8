//! Lock-free query counters.
//!
//! The pipeline is the only writer; the admin surface reads coherent
//! snapshots. Counters are monotone for the process lifetime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::db::unix_now;

#[derive(Debug)]
pub struct StatsCollector {
    total_queries: AtomicU64,
    blocked_queries: AtomicU64,
    cached_responses: AtomicU64,
    started_at: Instant,
    started_at_unix: u64,
}

/// A coherent point-in-time read of the counters.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StatsSnapshot {
    pub total_queries: u64,
    pub blocked_queries: u64,
    pub cached_responses: u64,
    pub uptime_seconds: u64,
    pub started_at: u64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            total_queries: AtomicU64::new(0),
            blocked_queries: AtomicU64::new(0),
            cached_responses: AtomicU64::new(0),
            started_at: Instant::now(),
            started_at_unix: unix_now(),
        }
    }

    pub fn inc_queries(&self) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_blocked(&self) {
        self.blocked_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cached(&self) {
        self.cached_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_queries: self.total_queries.load(Ordering::Relaxed),
            blocked_queries: self.blocked_queries.load(Ordering::Relaxed),
            cached_responses: self.cached_responses.load(Ordering::Relaxed),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            started_at: self.started_at_unix,
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}
