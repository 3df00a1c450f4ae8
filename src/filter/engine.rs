//! The domain match engine.
//!
//! Holds the three domain sets (remote blocklist, custom blocklist,
//! whitelist) behind a single reader/writer lock: the hot-path decision
//! reads all three together, so one lock keeps the critical section small
//! and removes any ordering hazard between them. The remote set sits behind
//! an `Arc` so a full update swaps a pointer instead of rewriting millions
//! of entries inside the lock.

use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::db::Database;
use crate::filter::bootstrap::BootstrapResolver;
use crate::filter::schedule;

pub(super) const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
pub(super) struct FilterSets {
    /// Aggregated remote blocklist; replaced wholesale on update.
    pub(super) remote: Arc<FxHashSet<String>>,
    /// User-managed blocklist; small, mutated in place.
    pub(super) custom: FxHashSet<String>,
    /// Literal domains and `*.suffix` patterns.
    pub(super) whitelist: FxHashSet<String>,
}

pub struct FilterEngine {
    pub(super) config: Config,
    pub(super) db: Arc<Database>,
    pub(super) sets: RwLock<FilterSets>,
    pub(super) http: reqwest::Client,
}

impl FilterEngine {
    /// Builds the engine from a validated config and the database snapshot.
    ///
    /// Seeds the whitelist from config and persisted entries, and loads the
    /// remote set saved by the last successful update. Callers run a full
    /// update when the loaded set turns out empty.
    pub fn new(config: Config, db: Arc<Database>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("dns-warden/", env!("CARGO_PKG_VERSION")))
            .timeout(FETCH_TIMEOUT)
            .dns_resolver(Arc::new(BootstrapResolver::new(
                config.server.bootstrap_dns.clone(),
            )))
            .build()
            .context("Failed to build blocklist HTTP client")?;

        let mut whitelist = FxHashSet::default();
        for domain in &config.whitelist.domains {
            let normalized = normalize_domain(domain);
            if !normalized.is_empty() {
                whitelist.insert(normalized);
            }
        }
        for domain in db.whitelist().context("Failed to load whitelist")? {
            whitelist.insert(domain);
        }

        let remote = db.load_blocklist().context("Failed to load blocklist")?;
        info!(
            "Filter engine loaded {} remote and {} whitelist entries",
            remote.len(),
            whitelist.len()
        );

        Ok(Self {
            config,
            db,
            sets: RwLock::new(FilterSets {
                remote: Arc::new(remote),
                custom: FxHashSet::default(),
                whitelist,
            }),
            http,
        })
    }

    /// The block decision. Whitelist wins over everything, then strict
    /// schedule windows, then exact and parent-domain membership in the
    /// blocklists.
    pub fn should_block(&self, name: &str) -> bool {
        let domain = normalize_domain(name);
        if domain.is_empty() {
            return false;
        }

        let sets = self.sets.read().unwrap();

        if is_whitelisted(&sets.whitelist, &domain) {
            return false;
        }

        if self.config.filtering.schedule.enabled
            && schedule::restricted_strict_now(&self.config.filtering.schedule.rules)
        {
            return true;
        }

        if sets.custom.contains(&domain) || sets.remote.contains(&domain) {
            return true;
        }

        // Walk parents: a.b.example.com matches a block on example.com
        let mut rest = domain.as_str();
        while let Some(idx) = rest.find('.') {
            rest = &rest[idx + 1..];
            if rest.is_empty() {
                break;
            }
            if sets.custom.contains(rest) || sets.remote.contains(rest) {
                return true;
            }
        }

        false
    }

    pub fn is_whitelisted(&self, name: &str) -> bool {
        let domain = normalize_domain(name);
        let sets = self.sets.read().unwrap();
        is_whitelisted(&sets.whitelist, &domain)
    }

    /// `|remote| + |custom|`.
    pub fn blocked_count(&self) -> usize {
        let sets = self.sets.read().unwrap();
        sets.remote.len() + sets.custom.len()
    }

    pub fn add_whitelist(&self, domain: &str) -> Result<()> {
        let domain = normalize_domain(domain);
        {
            let mut sets = self.sets.write().unwrap();
            sets.whitelist.insert(domain.clone());
        }
        self.db.add_to_whitelist(&domain)?;
        info!("Added {} to whitelist", domain);
        Ok(())
    }

    pub fn remove_whitelist(&self, domain: &str) -> Result<()> {
        let domain = normalize_domain(domain);
        {
            let mut sets = self.sets.write().unwrap();
            sets.whitelist.remove(&domain);
        }
        self.db.remove_from_whitelist(&domain)?;
        info!("Removed {} from whitelist", domain);
        Ok(())
    }

    pub fn whitelist(&self) -> Vec<String> {
        let sets = self.sets.read().unwrap();
        let mut list: Vec<String> = sets.whitelist.iter().cloned().collect();
        list.sort();
        list
    }

    pub fn add_custom(&self, domain: &str) {
        let domain = normalize_domain(domain);
        let mut sets = self.sets.write().unwrap();
        sets.custom.insert(domain.clone());
        info!("Added {} to custom blocklist", domain);
    }

    pub fn remove_custom(&self, domain: &str) {
        let domain = normalize_domain(domain);
        let mut sets = self.sets.write().unwrap();
        sets.custom.remove(&domain);
        info!("Removed {} from custom blocklist", domain);
    }

    pub fn custom(&self) -> Vec<String> {
        let sets = self.sets.read().unwrap();
        let mut list: Vec<String> = sets.custom.iter().cloned().collect();
        list.sort();
        list
    }
}

/// Matches a literal whitelist entry, or any `*.SUFFIX` pattern where the
/// name ends with the string `.SUFFIX`. Keeping the dot in the suffix test
/// means the pattern covers subdomains only: neither the apex itself nor
/// an unrelated name sharing the tail (`notexample.com`) matches.
fn is_whitelisted(whitelist: &FxHashSet<String>, domain: &str) -> bool {
    if whitelist.contains(domain) {
        return true;
    }

    for entry in whitelist {
        if entry.starts_with("*.") {
            let pattern = &entry[1..];
            if domain.ends_with(pattern) {
                return true;
            }
        }
    }

    false
}

/// Lowercases and strips surrounding whitespace and the trailing dot.
pub fn normalize_domain(domain: &str) -> String {
    domain
        .trim()
        .trim_end_matches('.')
        .to_ascii_lowercase()
}
