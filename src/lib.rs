//! dns-warden: a filtering DNS resolver.
//!
//! Accepts DNS queries over UDP, answers blocked names with a configurable
//! deny reply, and forwards everything else verbatim to a round-robin pool
//! of upstream resolvers, caching successful answers.

pub mod admin;
pub mod cache;
pub mod config;
pub mod db;
pub mod filter;
pub mod logger;
pub mod server;
pub mod stats;
pub mod upstream;
