use crate::logger::types::{QueryLogAction, QueryLogEntry, QueryLogSink};
use tracing::info;

/// Writes query events through the tracing subscriber.
pub struct ConsoleLogSink;

impl QueryLogSink for ConsoleLogSink {
    fn log(&self, entry: &QueryLogEntry) {
        let action = match entry.action {
            QueryLogAction::Blocked => "blocked",
            QueryLogAction::Cached => "served from cache",
            QueryLogAction::Forwarded => "forwarded upstream",
            QueryLogAction::Failed => "failed upstream",
        };

        info!(
            "[{}] {} {} -> {} [{}ms]",
            entry.query_type, entry.client_ip, entry.domain, action, entry.latency_ms
        );
    }
}
