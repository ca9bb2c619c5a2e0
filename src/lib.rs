//! gcpscan - Google Cloud resources as rows
//!
//! Lists Google Cloud resources through a shared engine that fans one listing
//! out over regions, zones and locations, pages under a row budget, rate
//! limits every page fetch and pushes column predicates down as provider
//! filters.
//!
//! # Example
//!
//! ```ignore
//! use gcpscan::config::Config;
//! use gcpscan::connection::Connection;
//! use gcpscan::engine::{Flow, PredicateSet};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let conn = Connection::connect(Config::load()).await?;
//!     let mut sink = |row: serde_json::Value| {
//!         println!("{}", row["name"]);
//!         Flow::Continue
//!     };
//!     conn.list("compute-instances", &PredicateSet::new(), Some(10), &mut sink).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod engine;
pub mod gcp;
pub mod output;
pub mod resource;

/// Version injected at compile time via GCPSCAN_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("GCPSCAN_VERSION") {
    Some(v) => v,
    None => "dev",
};
