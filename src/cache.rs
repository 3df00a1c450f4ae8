//! Bounded response cache keyed by (normalized name, record type).
//!
//! Stores the wire bytes of upstream replies. Entries are treated as
//! immutable: `get` and `insert` both copy, so a caller patching its copy's
//! transaction ID never perturbs concurrent readers. Expired entries are
//! skipped by `get` and removed by the periodic cleaner; `insert` evicts
//! the oldest entry by insertion time when the cache is full.

use hickory_proto::rr::RecordType;
use rustc_hash::FxHashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

const CLEANER_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CacheEntry {
    response: Vec<u8>,
    inserted: Instant,
}

#[derive(Debug)]
pub struct ResponseCache {
    entries: RwLock<FxHashMap<(String, RecordType), CacheEntry>>,
    max_size: usize,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            max_size,
            ttl,
        }
    }

    /// Returns a copy of the cached reply bytes, or None when absent or
    /// expired. Expired entries are left in place for the cleaner.
    pub fn get(&self, name: &str, qtype: RecordType) -> Option<Vec<u8>> {
        let entries = self.entries.read().unwrap();
        let entry = entries.get(&(name.to_string(), qtype))?;
        if entry.inserted.elapsed() > self.ttl {
            return None;
        }
        Some(entry.response.clone())
    }

    /// Stores a copy of the reply bytes stamped with the current time,
    /// evicting the oldest entry first when the cache is full.
    pub fn insert(&self, name: &str, qtype: RecordType, response: &[u8]) {
        let mut entries = self.entries.write().unwrap();
        if entries.len() >= self.max_size {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted)
                .map(|(key, _)| key.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            (name.to_string(), qtype),
            CacheEntry {
                response: response.to_vec(),
                inserted: Instant::now(),
            },
        );
    }

    /// Drops every entry. Readers that arrive after this returns observe an
    /// empty store.
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap();
        *entries = FxHashMap::default();
    }

    pub fn size(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    fn sweep_expired(&self) {
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted.elapsed() <= self.ttl);
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Cache cleaner removed {} expired entries", removed);
        }
    }

    /// Spawns the periodic sweep of expired entries.
    pub fn spawn_cleaner(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANER_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                self.sweep_expired();
            }
        });
    }
}
