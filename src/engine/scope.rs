//! Scope Enumerator
//!
//! Decides where a listing has to look: one global scope, one wildcard scope
//! for server-side aggregation, or one scope per region, zone or named
//! location. Location lists are discovered once per connection and memoized in
//! the [`ResolutionCache`].

use super::cache::ResolutionCache;
use super::error::{ListError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Token of the single global scope.
pub const GLOBAL_TOKEN: &str = "global";

/// Token asking the provider to aggregate across every scope server-side.
pub const AGGREGATED_TOKEN: &str = "-";

/// Partition kind of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Global,
    Regional,
    Zonal,
    NamedLocation,
}

/// Where a single listing call is issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    kind: ScopeKind,
    token: String,
}

impl Scope {
    pub fn new(kind: ScopeKind, token: impl Into<String>) -> Self {
        Self {
            kind,
            token: token.into(),
        }
    }

    pub fn global() -> Self {
        Self::new(ScopeKind::Global, GLOBAL_TOKEN)
    }

    pub fn aggregated(kind: ScopeKind) -> Self {
        Self::new(kind, AGGREGATED_TOKEN)
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_aggregated(&self) -> bool {
        self.token == AGGREGATED_TOKEN
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

/// How a resource type is partitioned.
///
/// Deserialized from the resource registry, e.g.
/// `{"kind": "zonal", "aggregated": true}` or
/// `{"kind": "locations", "service": "artifactregistry"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Granularity {
    Global,
    Regional {
        #[serde(default)]
        aggregated: bool,
    },
    Zonal {
        #[serde(default)]
        aggregated: bool,
    },
    Locations {
        /// Static allow-list. Empty means "discover from `service`".
        #[serde(default)]
        allow: Vec<String>,
        #[serde(default)]
        service: Option<String>,
    },
}

/// Finite, restartable sequence of scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSet {
    scopes: Arc<[Scope]>,
}

impl ScopeSet {
    pub fn iter(&self) -> std::slice::Iter<'_, Scope> {
        self.scopes.iter()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

impl From<Vec<Scope>> for ScopeSet {
    fn from(scopes: Vec<Scope>) -> Self {
        Self {
            scopes: scopes.into(),
        }
    }
}

impl<'a> IntoIterator for &'a ScopeSet {
    type Item = &'a Scope;
    type IntoIter = std::slice::Iter<'a, Scope>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Source of region, zone and per-service location names.
#[async_trait]
pub trait LocationDiscovery: Send + Sync {
    async fn regions(&self) -> Result<Vec<String>>;
    async fn zones(&self) -> Result<Vec<String>>;
    async fn locations(&self, service: &str) -> Result<Vec<String>>;
}

/// Region part of a zone name: `us-central1-a` -> `us-central1`.
pub fn region_of_zone(zone: &str) -> &str {
    zone.rsplit_once('-').map(|(region, _)| region).unwrap_or(zone)
}

/// Produces the scopes for a [`Granularity`].
#[derive(Clone)]
pub struct ScopeEnumerator {
    discovery: Arc<dyn LocationDiscovery>,
    cache: ResolutionCache,
    region_allow: Vec<String>,
}

impl ScopeEnumerator {
    pub fn new(discovery: Arc<dyn LocationDiscovery>, cache: ResolutionCache) -> Self {
        Self {
            discovery,
            cache,
            region_allow: Vec::new(),
        }
    }

    /// Restrict per-region and per-zone fan-out to these regions.
    pub fn with_regions(mut self, regions: Vec<String>) -> Self {
        self.region_allow = regions;
        self
    }

    pub async fn enumerate(&self, granularity: &Granularity) -> Result<ScopeSet> {
        let scopes = match granularity {
            Granularity::Global => vec![Scope::global()],
            Granularity::Regional { aggregated: true } => {
                vec![Scope::aggregated(ScopeKind::Regional)]
            },
            Granularity::Zonal { aggregated: true } => vec![Scope::aggregated(ScopeKind::Zonal)],
            Granularity::Regional { aggregated: false } => self
                .regions()
                .await?
                .into_iter()
                .map(|region| Scope::new(ScopeKind::Regional, region))
                .collect(),
            Granularity::Zonal { aggregated: false } => self
                .zones()
                .await?
                .into_iter()
                .map(|zone| Scope::new(ScopeKind::Zonal, zone))
                .collect(),
            Granularity::Locations { allow, service } => {
                let names = if !allow.is_empty() {
                    allow.clone()
                } else if let Some(service) = service {
                    self.locations(service).await?
                } else {
                    return Err(ListError::Config(
                        "location granularity needs an allow-list or a discovery service"
                            .to_string(),
                    ));
                };
                names
                    .into_iter()
                    .map(|name| Scope::new(ScopeKind::NamedLocation, name))
                    .collect()
            },
        };

        tracing::debug!(?granularity, scopes = scopes.len(), "Enumerated scopes");
        Ok(ScopeSet::from(scopes))
    }

    async fn regions(&self) -> Result<Vec<String>> {
        if !self.region_allow.is_empty() {
            return Ok(self.region_allow.clone());
        }
        let discovery = self.discovery.clone();
        self.cache
            .get_or_compute("regions", || async move { discovery.regions().await })
            .await
            .map_err(|e| ListError::discovery("regions", e))
    }

    async fn zones(&self) -> Result<Vec<String>> {
        let discovery = self.discovery.clone();
        let zones: Vec<String> = self
            .cache
            .get_or_compute("zones", || async move { discovery.zones().await })
            .await
            .map_err(|e| ListError::discovery("zones", e))?;

        if self.region_allow.is_empty() {
            return Ok(zones);
        }
        Ok(zones
            .into_iter()
            .filter(|zone| self.region_allow.iter().any(|r| r == region_of_zone(zone)))
            .collect())
    }

    async fn locations(&self, service: &str) -> Result<Vec<String>> {
        let discovery = self.discovery.clone();
        let key = format!("locations/{}", service);
        let owned = service.to_string();
        self.cache
            .get_or_compute(&key, || async move { discovery.locations(&owned).await })
            .await
            .map_err(|e| ListError::discovery(key.clone(), e))
    }
}
