//! Resource Registry - Load resource definitions from JSON
//!
//! This module loads all GCP resource definitions from embedded JSON files
//! and provides lookup functions for the rest of the application.

use crate::engine::{FieldMap, Granularity};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[&str] = &[
    include_str!("../resources/compute.json"),
    include_str!("../resources/storage.json"),
    include_str!("../resources/gke.json"),
    include_str!("../resources/artifactregistry.json"),
];

/// Resource definition from JSON
///
/// Paths are relative to the service root and may contain `{project}` and
/// `{scope}` placeholders.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    pub display_name: String,
    pub service: String,
    pub list_path: String,
    /// Server-side aggregated listing, used for the `-` scope
    #[serde(default)]
    pub aggregated_path: Option<String>,
    /// Dot path of the item array in a list response
    pub response_path: String,
    pub granularity: Granularity,
    pub max_page_size: u32,
    /// Query parameter carrying the page size; `None` when the API does not page by size
    #[serde(default)]
    pub page_size_param: Option<String>,
    /// Query parameter carrying the compiled filter; `None` disables push-down
    #[serde(default)]
    pub filter_param: Option<String>,
    /// Static query parameters
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub id_field: String,
    /// Filterable columns
    #[serde(default)]
    pub filters: FieldMap,
}

impl ResourceDef {
    /// Filterable columns that can actually be pushed down to the provider
    pub fn pushdown_fields(&self) -> FieldMap {
        if self.filter_param.is_some() {
            self.filters.clone()
        } else {
            FieldMap::new()
        }
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    pub resources: HashMap<String, ResourceDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<ResourceConfig> = OnceLock::new();

/// Get the resource registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static ResourceConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = ResourceConfig {
            resources: HashMap::new(),
        };

        for content in RESOURCE_FILES {
            let partial: ResourceConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded resource JSON: {}", e));
            final_config.resources.extend(partial.resources);
        }

        final_config
    })
}

/// Get a resource definition by key
pub fn get_resource(key: &str) -> Option<&'static ResourceDef> {
    get_registry().resources.get(key)
}

/// Get all resource keys, sorted
pub fn get_all_resource_keys() -> Vec<&'static str> {
    let mut keys: Vec<&'static str> = get_registry()
        .resources
        .keys()
        .map(|s| s.as_str())
        .collect();
    keys.sort_unstable();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FieldKind;

    #[test]
    fn test_registry_loads_successfully() {
        let registry = get_registry();
        assert!(
            !registry.resources.is_empty(),
            "Registry should have resources"
        );
    }

    #[test]
    fn test_compute_instances_resource_exists() {
        let resource = get_resource("compute-instances").expect("compute-instances should exist");

        assert_eq!(resource.display_name, "VM Instances");
        assert_eq!(resource.service, "compute");
        assert_eq!(
            resource.granularity,
            Granularity::Zonal { aggregated: true }
        );
        assert!(resource.aggregated_path.is_some());
        assert_eq!(resource.max_page_size, 500);
    }

    #[test]
    fn test_backend_services_map_enable_cdn() {
        let resource = get_resource("compute-backend-services").unwrap();
        let field = &resource.filters["enable_cdn"];
        assert_eq!(field.field, "enableCdn");
        assert_eq!(field.kind, FieldKind::Bool);
    }

    #[test]
    fn test_location_resources_name_discovery_service() {
        let resource = get_resource("artifact-registry-repositories").unwrap();
        assert_eq!(
            resource.granularity,
            Granularity::Locations {
                allow: vec![],
                service: Some("artifactregistry".to_string()),
            }
        );
    }

    #[test]
    fn test_pushdown_requires_filter_param() {
        assert!(get_resource("gke-clusters").unwrap().pushdown_fields().is_empty());
        assert!(!get_resource("compute-disks").unwrap().pushdown_fields().is_empty());
    }

    #[test]
    fn test_every_resource_is_consistent() {
        for (key, resource) in &get_registry().resources {
            assert!(resource.max_page_size > 0, "{key} has no page size");
            if let Some(column) = resource.filters.get(&resource.id_field) {
                assert_eq!(column.kind, FieldKind::String, "{key} id column must be a string");
            }
        }
    }

    #[test]
    fn test_get_all_resource_keys() {
        let keys = get_all_resource_keys();
        assert!(keys.contains(&"compute-instances"));
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
    }
}
