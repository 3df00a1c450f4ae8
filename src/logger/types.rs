use hickory_proto::rr::RecordType;
use std::net::IpAddr;
use std::sync::Arc;

/// One structured query event emitted by the pipeline.
#[derive(Debug, Clone)]
pub struct QueryLogEntry {
    pub client_ip: IpAddr,
    pub domain: Arc<str>,
    pub query_type: RecordType,
    pub action: QueryLogAction,
    pub latency_ms: u64,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum QueryLogAction {
    Blocked,
    Cached,
    Forwarded,
    Failed,
}

pub trait QueryLogSink: Send + Sync {
    fn log(&self, entry: &QueryLogEntry);
}
