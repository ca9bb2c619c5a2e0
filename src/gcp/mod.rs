//! GCP API interaction module
//!
//! Authentication, the REST client, and the project and location lookups the
//! listing engine needs.
//!
//! # Module Structure
//!
//! - [`auth`] - Application Default Credentials, static tokens, gcloud defaults
//! - [`client`] - Authenticated GET client and service URL roots
//! - [`http`] - HTTP transport and Google error parsing
//! - [`locations`] - Region, zone and service location discovery
//! - [`projects`] - Project metadata
//!
//! # Example
//!
//! ```ignore
//! use gcpscan::gcp::auth::GcpCredentials;
//! use gcpscan::gcp::client::GcpClient;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = GcpClient::with_credentials(GcpCredentials::new().await?)?;
//!     let zones = client.get(&client.compute_url("my-project", "zones")).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod locations;
pub mod projects;
