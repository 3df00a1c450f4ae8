//! SQLite persistence for the filter state and block events.
//!
//! Holds three tables: `blocked_queries` (append-only block events),
//! `blocklist` (a full-replacement snapshot of the remote set), and
//! `whitelist`. The query hot path never touches this module directly; the
//! filter engine and pipeline call in from outside their locks.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use rustc_hash::FxHashSet;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

pub struct Database {
    conn: Mutex<Connection>,
}

/// One persisted block event.
#[derive(Debug, Clone)]
pub struct BlockedQuery {
    pub id: i64,
    pub domain: String,
    pub client_ip: String,
    pub timestamp: u64,
}

impl Database {
    /// Opens (or creates) the database and applies the schema.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened or the schema cannot be
    /// applied; callers treat this as fatal at startup.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open database")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS blocked_queries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT NOT NULL,
                client_ip TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_blocked_timestamp ON blocked_queries(timestamp);
            CREATE INDEX IF NOT EXISTS idx_blocked_domain ON blocked_queries(domain);

            CREATE TABLE IF NOT EXISTS blocklist (
                domain TEXT PRIMARY KEY,
                added_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS whitelist (
                domain TEXT PRIMARY KEY,
                added_at INTEGER NOT NULL
            );",
        )
        .context("Failed to initialize database schema")?;

        info!("SQLite database initialized at {}", path);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Appends one block event. Runtime failures are the caller's to log
    /// and drop; they never stop the query path.
    pub fn log_blocked_query(&self, domain: &str, client_ip: &str, timestamp: u64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO blocked_queries (domain, client_ip, timestamp) VALUES (?1, ?2, ?3)",
        )?;
        stmt.execute(params![domain, client_ip, timestamp as i64])?;
        Ok(())
    }

    pub fn recent_blocked(&self, limit: usize) -> Result<Vec<BlockedQuery>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, domain, client_ip, timestamp
             FROM blocked_queries
             ORDER BY timestamp DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(BlockedQuery {
                id: row.get(0)?,
                domain: row.get(1)?,
                client_ip: row.get(2)?,
                timestamp: row.get::<_, i64>(3)? as u64,
            })
        })?;
        Ok(rows.filter_map(std::result::Result::ok).collect())
    }

    /// Replaces the persisted remote blocklist snapshot in one transaction.
    pub fn save_blocklist(&self, domains: &FxHashSet<String>) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = unix_now() as i64;

        tx.execute("DELETE FROM blocklist", [])?;
        {
            let mut stmt =
                tx.prepare_cached("INSERT INTO blocklist (domain, added_at) VALUES (?1, ?2)")?;
            for domain in domains {
                stmt.execute(params![domain, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_blocklist(&self) -> Result<FxHashSet<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT domain FROM blocklist")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut domains = FxHashSet::default();
        for row in rows {
            domains.insert(row?);
        }
        Ok(domains)
    }

    pub fn add_to_whitelist(&self, domain: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "INSERT OR REPLACE INTO whitelist (domain, added_at) VALUES (?1, ?2)",
        )?;
        stmt.execute(params![domain, unix_now() as i64])?;
        Ok(())
    }

    pub fn remove_from_whitelist(&self, domain: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("DELETE FROM whitelist WHERE domain = ?1")?;
        stmt.execute(params![domain])?;
        Ok(())
    }

    pub fn whitelist(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT domain FROM whitelist ORDER BY domain")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.filter_map(std::result::Result::ok).collect())
    }

    /// Prunes block events older than the retention window.
    pub fn cleanup_old_logs(&self, retention_days: u64) -> Result<()> {
        let cutoff = unix_now() as i64 - (retention_days * 86400) as i64;
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("DELETE FROM blocked_queries WHERE timestamp < ?1")?;
        stmt.execute(params![cutoff])?;
        Ok(())
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
