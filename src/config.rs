//! Configuration Management
//!
//! Persistent settings for gcpscan, merged with command-line overrides and
//! gcloud defaults.

use crate::engine::ErrorPolicy;
use crate::engine::scope::region_of_zone;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Zone used when neither the config nor gcloud name one
pub const FALLBACK_ZONE: &str = "us-central1-a";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Project to list resources of
    pub project: Option<String>,
    /// Default region
    pub region: Option<String>,
    /// Default zone
    pub zone: Option<String>,
    /// Restrict per-region and per-zone fan-out to these regions
    pub regions: Vec<String>,
    /// Error codes skipped per scope: HTTP status, canonical code or reason
    pub ignore_error_codes: Vec<String>,
    /// Error message substrings skipped per scope
    pub ignore_error_messages: Vec<String>,
    /// Page fetches per second across the connection
    pub requests_per_second: Option<u32>,
    /// Base URL replacing `https://<service>.googleapis.com`
    pub api_endpoint: Option<String>,
    /// Pre-issued bearer token; never written to disk
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gcpscan").join("config.json"))
    }

    /// Load configuration from the default location
    ///
    /// A missing or unreadable file yields the default configuration.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring config file {}: {:#}", path.display(), e);
                Self::default()
            },
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Overlay values set in `other` on top of this configuration
    pub fn merge(mut self, other: Config) -> Self {
        if other.project.is_some() {
            self.project = other.project;
        }
        if other.region.is_some() {
            self.region = other.region;
        }
        if other.zone.is_some() {
            self.zone = other.zone;
        }
        if !other.regions.is_empty() {
            self.regions = other.regions;
        }
        if !other.ignore_error_codes.is_empty() {
            self.ignore_error_codes = other.ignore_error_codes;
        }
        if !other.ignore_error_messages.is_empty() {
            self.ignore_error_messages = other.ignore_error_messages;
        }
        if other.requests_per_second.is_some() {
            self.requests_per_second = other.requests_per_second;
        }
        if other.api_endpoint.is_some() {
            self.api_endpoint = other.api_endpoint;
        }
        if other.access_token.is_some() {
            self.access_token = other.access_token;
        }
        self
    }

    /// Get effective project (CLI > config > gcloud default)
    pub fn effective_project(&self) -> Option<String> {
        self.project
            .clone()
            .filter(|p| !p.is_empty())
            .or_else(crate::gcp::auth::get_default_project)
    }

    /// Get effective zone (CLI > config > gcloud default)
    pub fn effective_zone(&self) -> String {
        self.zone
            .clone()
            .or_else(crate::gcp::auth::get_default_zone)
            .unwrap_or_else(|| FALLBACK_ZONE.to_string())
    }

    /// Get effective region (CLI > config > gcloud default > region of the zone)
    pub fn effective_region(&self) -> String {
        self.region
            .clone()
            .or_else(crate::gcp::auth::get_default_region)
            .unwrap_or_else(|| region_of_zone(&self.effective_zone()).to_string())
    }

    /// Per-scope error recovery policy
    pub fn error_policy(&self) -> ErrorPolicy {
        ErrorPolicy::new(
            self.ignore_error_codes.clone(),
            self.ignore_error_messages.clone(),
        )
    }
}
