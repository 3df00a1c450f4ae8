//! Configuration module for `dns-warden`.
//!
//! Defines the structure and default values for the resolver configuration.
//! Uses `serde` for deserialization and `toml` for the file format.
//!
//! # Example Config
//! ```toml
//! [server]
//! dns_host = "0.0.0.0"
//! dns_port = 53
//! upstream_dns = ["1.1.1.1:53", "8.8.8.8:53"]
//!
//! [filtering]
//! enabled = true
//! block_action = "nxdomain"
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Main configuration struct holding all settings for the resolver.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub filtering: FilteringConfig,

    #[serde(default)]
    pub blocklists: BlocklistsConfig,

    #[serde(default)]
    pub whitelist: WhitelistConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener, upstream, and cache settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// The IP address to bind the DNS listener to (e.g., "0.0.0.0").
    #[serde(default = "default_dns_host")]
    pub dns_host: String,

    /// The UDP port to listen on.
    #[serde(default = "default_dns_port")]
    pub dns_port: u16,

    /// Ordered list of upstream resolvers as "addr:port".
    #[serde(default)]
    pub upstream_dns: Vec<String>,

    /// Resolvers used for the process's own outbound lookups (blocklist
    /// downloads), so the filter never resolves its own fetch URLs through
    /// itself.
    #[serde(default = "default_bootstrap_dns")]
    pub bootstrap_dns: Vec<String>,

    /// Maximum number of cached responses.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    /// Cache entry lifetime in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
}

/// Filtering behavior and schedule policy.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FilteringConfig {
    /// Global switch; when false every query is forwarded.
    #[serde(default = "default_filtering_enabled")]
    pub enabled: bool,

    /// Reply shape for blocked queries.
    #[serde(default)]
    pub block_action: BlockAction,

    /// Target address for `block_action = "redirect"`.
    #[serde(default = "default_redirect_ip")]
    pub redirect_ip: String,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Wire-level reply shape used to deny a query.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockAction {
    /// NXDOMAIN, no answers.
    #[default]
    Nxdomain,
    /// A record pointing at `redirect_ip`.
    Redirect,
    /// A record pointing at 127.0.0.1.
    BlockPage,
}

/// Time-window restrictions layered on top of the blocklists.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub rules: Vec<ScheduleRule>,
}

/// A single schedule window. `start_time`/`end_time` are zero-padded
/// 24-hour "HH:MM" strings; comparison is lexicographic, which coincides
/// with time order for that format.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScheduleRule {
    #[serde(default)]
    pub name: String,

    /// Lowercase weekday names ("monday", ...).
    pub days: Vec<String>,

    pub start_time: String,
    pub end_time: String,

    /// When true, everything not whitelisted is blocked inside the window.
    #[serde(default)]
    pub strict_mode: bool,
}

/// Remote blocklist sources and custom list discovery.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BlocklistsConfig {
    /// Hours between automatic updates; 0 disables the updater.
    #[serde(default = "default_auto_update_interval")]
    pub auto_update_interval: u64,

    #[serde(default)]
    pub sources: Vec<BlocklistSource>,

    /// Glob matching custom YAML blocklist files.
    #[serde(default = "default_custom_path")]
    pub custom_path: String,
}

/// One remote blocklist source. Disabled sources contribute nothing.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BlocklistSource {
    pub name: String,
    /// HTTP(S) URL or `file://` path.
    pub url: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_source_enabled")]
    pub enabled: bool,
}

/// Seed whitelist applied at engine construction.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct WhitelistConfig {
    #[serde(default)]
    pub domains: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Days to keep block events before pruning.
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level directive (e.g., "info", "debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit a debug event per query.
    #[serde(default = "default_log_queries")]
    pub log_queries: bool,
}

// Defaults
fn default_dns_host() -> String {
    "0.0.0.0".to_string()
}
fn default_dns_port() -> u16 {
    53
}
fn default_bootstrap_dns() -> Vec<String> {
    vec!["8.8.8.8:53".to_string()]
}
fn default_cache_size() -> usize {
    10000
}
fn default_cache_ttl() -> u64 {
    3600
}
fn default_filtering_enabled() -> bool {
    true
}
fn default_redirect_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_auto_update_interval() -> u64 {
    24
}
fn default_custom_path() -> String {
    "./configs/custom*.yaml".to_string()
}
fn default_source_enabled() -> bool {
    true
}
fn default_db_path() -> String {
    "dns-warden.db".to_string()
}
fn default_log_retention_days() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_queries() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            dns_host: default_dns_host(),
            dns_port: default_dns_port(),
            upstream_dns: vec![],
            bootstrap_dns: default_bootstrap_dns(),
            cache_size: default_cache_size(),
            cache_ttl: default_cache_ttl(),
        }
    }
}

impl Default for FilteringConfig {
    fn default() -> Self {
        Self {
            enabled: default_filtering_enabled(),
            block_action: BlockAction::default(),
            redirect_ip: default_redirect_ip(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Default for BlocklistsConfig {
    fn default() -> Self {
        Self {
            auto_update_interval: default_auto_update_interval(),
            sources: vec![],
            custom_path: default_custom_path(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            log_retention_days: default_log_retention_days(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_queries: default_log_queries(),
        }
    }
}

impl Config {
    /// Loads and validates the configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML fails to
    /// parse, or a schedule rule carries a malformed time.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks schedule rule time formats. Lexicographic "HH:MM" comparison
    /// is only correct for zero-padded 24-hour times, so the format is
    /// enforced here rather than at query time.
    pub fn validate(&self) -> Result<()> {
        for rule in &self.filtering.schedule.rules {
            for time in [&rule.start_time, &rule.end_time] {
                if !is_hhmm(time) {
                    bail!(
                        "Invalid schedule time {:?} in rule {:?} (expected zero-padded HH:MM)",
                        time,
                        rule.name
                    );
                }
            }
        }
        Ok(())
    }
}

fn is_hhmm(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return false;
    }
    if !bytes[0].is_ascii_digit()
        || !bytes[1].is_ascii_digit()
        || !bytes[3].is_ascii_digit()
        || !bytes[4].is_ascii_digit()
    {
        return false;
    }
    let hour = (bytes[0] - b'0') * 10 + (bytes[1] - b'0');
    let minute = (bytes[3] - b'0') * 10 + (bytes[4] - b'0');
    hour < 24 && minute < 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        assert_eq!(config.server.dns_host, "0.0.0.0");
        assert_eq!(config.server.dns_port, 53);
        assert_eq!(config.server.cache_size, 10000);
        assert_eq!(config.server.cache_ttl, 3600);
        assert!(config.filtering.enabled);
        assert_eq!(config.filtering.block_action, BlockAction::Nxdomain);
        assert_eq!(config.blocklists.custom_path, "./configs/custom*.yaml");
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
            [server]
            dns_host = "127.0.0.1"
            dns_port = 5353
            upstream_dns = ["9.9.9.9:53"]

            [filtering]
            block_action = "redirect"
            redirect_ip = "10.0.0.1"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.dns_host, "127.0.0.1");
        assert_eq!(config.server.dns_port, 5353);
        assert_eq!(config.filtering.block_action, BlockAction::Redirect);
        assert_eq!(config.filtering.redirect_ip, "10.0.0.1");
        // Defaults should still hold for missing fields
        assert_eq!(config.server.cache_size, 10000);
        assert!(config.filtering.enabled);
    }

    #[test]
    fn test_blocklist_source_defaults() {
        let toml_str = r#"
            [[blocklists.sources]]
            name = "ads"
            url = "https://example.com/hosts.txt"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.blocklists.sources.len(), 1);
        assert!(config.blocklists.sources[0].enabled);
        assert_eq!(config.blocklists.sources[0].category, "");
    }

    #[test]
    fn test_schedule_time_validation() {
        let mut config = Config::default();
        config.filtering.schedule.rules.push(ScheduleRule {
            name: "homework".to_string(),
            days: vec!["monday".to_string()],
            start_time: "16:00".to_string(),
            end_time: "18:30".to_string(),
            strict_mode: true,
        });
        assert!(config.validate().is_ok());

        config.filtering.schedule.rules[0].start_time = "9:00".to_string();
        assert!(config.validate().is_err());

        config.filtering.schedule.rules[0].start_time = "25:00".to_string();
        assert!(config.validate().is_err());
    }
}
