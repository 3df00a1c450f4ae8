pub mod bootstrap;
pub mod engine;
pub mod ingest;
pub mod schedule;

pub use engine::{normalize_domain, FilterEngine};
pub use ingest::{CustomBlocklist, CustomBlocklistEntry};
