use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use dns_warden::admin::AdminHandle;
use dns_warden::cache::ResponseCache;
use dns_warden::config::Config;
use dns_warden::db::Database;
use dns_warden::filter::FilterEngine;
use dns_warden::logger::{ConsoleLogSink, QueryLogger};
use dns_warden::server::{DnsServer, Pipeline};
use dns_warden::stats::StatsCollector;
use dns_warden::upstream::UpstreamPool;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load config (before logging init to get the level)
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "configs/config.toml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        Config::load(&config_path).await?
    } else {
        Config::default()
    };

    // 2. Setup logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    info!("Starting dns-warden...");

    if !std::path::Path::new(&config_path).exists() {
        info!("Config file not found, using defaults.");
    }

    // 3. Database
    let db = Arc::new(Database::open(&config.database.path).context("Database startup failed")?);

    // 4. Filter engine, seeded from the persisted snapshot
    let filter = Arc::new(FilterEngine::new(config.clone(), Arc::clone(&db))?);
    if filter.blocked_count() == 0 {
        info!("No blocklists found in database, fetching configured lists...");
        if let Err(e) = filter.update_all().await {
            error!("Initial blocklist update failed: {:#}", e);
        }
    }
    info!(
        "Filter engine initialized with {} blocklist entries",
        filter.blocked_count()
    );

    // 5. Core components
    let stats = Arc::new(StatsCollector::new());
    let cache = Arc::new(ResponseCache::new(
        config.server.cache_size,
        Duration::from_secs(config.server.cache_ttl),
    ));
    Arc::clone(&cache).spawn_cleaner();
    let upstreams = Arc::new(UpstreamPool::new(config.server.upstream_dns.clone()));
    let logger = QueryLogger::new(vec![Box::new(ConsoleLogSink)]);

    let pipeline = Arc::new(Pipeline::new(
        config.clone(),
        Arc::clone(&filter),
        Arc::clone(&cache),
        upstreams.clone(),
        Arc::clone(&stats),
        logger,
        Arc::clone(&db),
    ));

    let admin = AdminHandle::new(
        Arc::clone(&filter),
        Arc::clone(&cache),
        Arc::clone(&stats),
        Arc::clone(&upstreams),
        Arc::clone(&db),
    );

    // 6. Background jobs: auto-updater and block-log retention
    if config.blocklists.auto_update_interval > 0 {
        let updater = admin.clone();
        let interval_hours = config.blocklists.auto_update_interval;
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(interval_hours * 3600));
            interval.tick().await;
            loop {
                interval.tick().await;
                info!("Starting scheduled blocklist update...");
                if let Err(e) = updater.update_all().await {
                    error!("Auto-update failed: {:#}", e);
                }
            }
        });
        info!(
            "Blocklist auto-update enabled (every {} hours)",
            interval_hours
        );
    }

    {
        let db = Arc::clone(&db);
        let retention_days = config.database.log_retention_days;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(6 * 3600));
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = db.cleanup_old_logs(retention_days) {
                    error!("Block-log cleanup failed: {:#}", e);
                }
            }
        });
    }

    // 7. Serve until SIGINT
    let server = DnsServer::bind(
        &config.server.dns_host,
        config.server.dns_port,
        Arc::clone(&pipeline),
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received.");
            let _ = shutdown_tx.send(true);
        }
    });

    server.serve(shutdown_rx).await?;
    info!("Shutdown complete.");
    Ok(())
}
