//! Resource abstraction layer
//!
//! Resource types are described by data, not code. Definitions are loaded
//! from JSON files at compile time, allowing new resource types to be added
//! without code changes.
//!
//! # Architecture
//!
//! - [`registry`] - Loads and caches resource definitions from embedded JSON
//! - [`fetcher`] - Serves pages of a resource type from its REST list endpoint
//!
//! # Resource Definitions
//!
//! Resources are defined in JSON files under `src/resources/`:
//! - `compute.json` - Compute Engine resources (VMs, disks, networks, backend services)
//! - `storage.json` - Cloud Storage buckets
//! - `gke.json` - GKE clusters
//! - `artifactregistry.json` - Artifact Registry repositories
//!
//! # Example
//!
//! ```ignore
//! use gcpscan::resource::{get_resource, RestSource};
//!
//! let def = get_resource("compute-instances").unwrap().clone();
//! let source = RestSource::new(client, def, "my-project");
//! ```

mod fetcher;
mod registry;

pub use fetcher::{
    extract_json_value, extract_short_name, lookup_json_path, RestSource, LOCATION_COLUMN,
};
pub use registry::*;
