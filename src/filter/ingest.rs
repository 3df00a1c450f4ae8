//! Blocklist ingestion: remote source fetching, line parsing, and custom
//! YAML loading.
//!
//! `update_all` does all heavy work on local sets before touching the
//! engine lock; the swap itself is a pointer replacement. Individual source
//! failures are logged and skipped — an update succeeds as long as at least
//! one source produced data.

use anyhow::{bail, Context, Result};
use futures::future::{BoxFuture, FutureExt};
use futures::{stream, StreamExt};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

use crate::filter::engine::{normalize_domain, FilterEngine};

const CONCURRENT_FETCHES: usize = 4;

/// One entry in a custom YAML blocklist. Only enabled entries participate.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomBlocklistEntry {
    pub domain: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub enabled: bool,
}

/// Top-level structure of `custom*.yaml` files.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomBlocklist {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub domains: Vec<CustomBlocklistEntry>,
}

impl FilterEngine {
    /// Fetches every enabled remote source, merges in the custom YAML
    /// lists, and swaps the aggregate in as the new remote set. The
    /// previous set stays live until the swap, so queries never observe a
    /// half-built set.
    pub fn update_all(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            info!("Updating blocklists...");

            let sources: Vec<_> = self
                .config
                .blocklists
                .sources
                .iter()
                .filter(|s| s.enabled)
                .cloned()
                .collect();

            let mut fetches: Vec<BoxFuture<'_, _>> = Vec::with_capacity(sources.len());
            for source in sources.iter() {
                fetches.push(
                    async move {
                        info!("Fetching blocklist: {}", source.name);
                        (source, self.fetch_blocklist(&source.url).await)
                    }
                    .boxed(),
                );
            }

            let results: Vec<_> = stream::iter(fetches)
                .buffer_unordered(CONCURRENT_FETCHES)
                .collect()
                .await;

            let mut fresh = FxHashSet::default();
            for (source, result) in results {
                match result {
                    Ok(domains) => {
                        info!("Loaded {} domains from {}", domains.len(), source.name);
                        fresh.extend(domains);
                    }
                    Err(e) => {
                        error!("Failed to fetch {}: {:#}", source.name, e);
                    }
                }
            }

            let (custom_domains, custom_count) = self.load_custom_yaml();
            if custom_count > 0 {
                info!("Loaded {} domains from custom blocklists", custom_count);
            }
            fresh.extend(custom_domains);

            if fresh.is_empty() {
                bail!("Blocklist update produced no domains from any source");
            }

            let fresh = Arc::new(fresh);
            {
                let mut sets = self.sets.write().unwrap();
                sets.remote = Arc::clone(&fresh);
            }

            if let Err(e) = self.db.save_blocklist(&fresh) {
                error!("Failed to save blocklist to database: {:#}", e);
            }

            info!(
                "Blocklist update complete: {} total domains blocked",
                fresh.len()
            );
            Ok(())
        }
        .boxed()
    }

    /// Re-reads the custom YAML files and unions their enabled domains into
    /// the custom set. Touches neither the remote set nor the network, so
    /// it is cheap and idempotent. Returns the number of entries loaded.
    pub fn reload_custom(&self) -> usize {
        let (domains, count) = self.load_custom_yaml();

        {
            let mut sets = self.sets.write().unwrap();
            sets.custom.extend(domains);
        }

        info!("Reloaded {} custom blocklist domains", count);
        count
    }

    /// Expands the configured glob and collects enabled, normalized
    /// domains. File order is irrelevant: the result is a union.
    fn load_custom_yaml(&self) -> (FxHashSet<String>, usize) {
        let mut result = FxHashSet::default();
        let mut count = 0;

        let paths = match glob::glob(&self.config.blocklists.custom_path) {
            Ok(paths) => paths,
            Err(e) => {
                warn!(
                    "Invalid custom blocklist glob {:?}: {}",
                    self.config.blocklists.custom_path, e
                );
                return (result, 0);
            }
        };

        for path in paths.filter_map(std::result::Result::ok) {
            let data = match std::fs::read_to_string(&path) {
                Ok(data) => data,
                Err(e) => {
                    warn!("Failed to read custom blocklist {:?}: {}", path, e);
                    continue;
                }
            };

            let list: CustomBlocklist = match serde_yaml::from_str(&data) {
                Ok(list) => list,
                Err(e) => {
                    warn!("Failed to parse custom blocklist {:?}: {}", path, e);
                    continue;
                }
            };

            let mut enabled = 0;
            for entry in &list.domains {
                if !entry.enabled {
                    continue;
                }
                let domain = normalize_domain(&entry.domain);
                if !domain.is_empty() {
                    result.insert(domain);
                    enabled += 1;
                }
            }
            count += enabled;
            info!(
                "Loaded custom blocklist: {:?} ({} enabled domains)",
                path, enabled
            );
        }

        (result, count)
    }

    /// Downloads (or reads, for `file://`) one source and returns its
    /// normalized domains.
    async fn fetch_blocklist(&self, source_url: &str) -> Result<Vec<String>> {
        let url = Url::parse(source_url).context("Invalid source URL")?;

        let body = if url.scheme() == "file" {
            tokio::fs::read_to_string(url.path())
                .await
                .with_context(|| format!("Failed to read {}", url.path()))?
        } else {
            let resp = self
                .http
                .get(url)
                .send()
                .await
                .context("Request failed")?;
            if !resp.status().is_success() {
                bail!("HTTP {}", resp.status());
            }
            resp.text().await.context("Failed to read body")?
        };

        let mut domains = Vec::new();
        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            if let Some(domain) = parse_domain_from_line(line) {
                let domain = normalize_domain(domain);
                if !domain.is_empty() {
                    domains.push(domain);
                }
            }
        }
        Ok(domains)
    }
}

/// Extracts the domain from one blocklist line, detecting the format:
/// hosts file (`0.0.0.0 example.com`), AdBlock (`||example.com^`), or a
/// plain domain per line.
fn parse_domain_from_line(line: &str) -> Option<&str> {
    if line.starts_with("0.0.0.0") || line.starts_with("127.0.0.1") {
        let mut fields = line.split_whitespace();
        let _addr = fields.next()?;
        let domain = fields.next()?;
        if domain == "localhost" || domain == "0.0.0.0" || domain == "127.0.0.1" {
            return None;
        }
        return Some(domain);
    }

    if let Some(rest) = line.strip_prefix("||") {
        let rest = rest.strip_suffix('^').unwrap_or(rest);
        let end = rest.find(['/', '^', '?']).unwrap_or(rest.len());
        return Some(&rest[..end]);
    }

    if !line.contains(' ') && line.contains('.') {
        return Some(line);
    }

    None
}
