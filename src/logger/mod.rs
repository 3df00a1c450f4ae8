//! Structured query-event logging.
//!
//! The pipeline hands each finished query to `QueryLogger`, which fans the
//! entry out to its sinks over bounded channels. A full channel drops the
//! entry rather than stalling the query path.

pub mod console_sink;
pub mod types;

pub use self::console_sink::ConsoleLogSink;
pub use self::types::{QueryLogAction, QueryLogEntry, QueryLogSink};

use std::sync::Arc;
use tokio::sync::mpsc;

const SINK_BUFFER: usize = 1000;

pub struct QueryLogger {
    sinks: Vec<mpsc::Sender<QueryLogEntry>>,
}

impl QueryLogger {
    pub fn new(sinks: Vec<Box<dyn QueryLogSink>>) -> Arc<Self> {
        let mut senders = Vec::new();

        for sink in sinks {
            let (tx, mut rx) = mpsc::channel::<QueryLogEntry>(SINK_BUFFER);
            tokio::spawn(async move {
                while let Some(entry) = rx.recv().await {
                    sink.log(&entry);
                }
            });
            senders.push(tx);
        }

        Arc::new(Self { sinks: senders })
    }

    /// Fire and forget; never blocks the caller.
    pub fn log(&self, entry: QueryLogEntry) {
        let len = self.sinks.len();
        for (i, sink) in self.sinks.iter().enumerate() {
            if i == len - 1 {
                let _ = sink.try_send(entry);
                break;
            }
            let _ = sink.try_send(entry.clone());
        }
    }
}
