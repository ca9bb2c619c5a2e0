//! GCP Client
//!
//! Main client for interacting with GCP APIs, combining authentication
//! and HTTP functionality.

use super::auth::GcpCredentials;
use super::http::GcpHttpClient;
use crate::engine::ListError;
use anyhow::Result;
use serde_json::Value;

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    pub credentials: GcpCredentials,
    pub http: GcpHttpClient,
    /// Base URL replacing every `https://<service>.googleapis.com` root
    pub endpoint: Option<String>,
}

impl GcpClient {
    /// Create a client around existing credentials
    pub fn with_credentials(credentials: GcpCredentials) -> Result<Self> {
        Ok(Self {
            credentials,
            http: GcpHttpClient::new()?,
            endpoint: None,
        })
    }

    /// Route every request to `endpoint` instead of googleapis.com
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        self.endpoint = Some(endpoint.trim_end_matches('/').to_string());
        self
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str) -> Result<Value, ListError> {
        let token = self.credentials.get_token().await?;
        self.http.get(url, &token).await
    }

    /// API root for a service, e.g. `https://compute.googleapis.com/compute/v1`
    pub fn service_root(&self, service: &str) -> String {
        if let Some(endpoint) = &self.endpoint {
            return format!("{}/{}/v1", endpoint, service);
        }

        match service {
            "compute" => "https://compute.googleapis.com/compute/v1".to_string(),
            "storage" => "https://storage.googleapis.com/storage/v1".to_string(),
            other => format!("https://{}.googleapis.com/v1", other),
        }
    }

    /// Build a full API URL from a service and a path relative to its root
    pub fn service_url(&self, service: &str, path: &str) -> String {
        format!(
            "{}/{}",
            self.service_root(service),
            path.trim_start_matches('/')
        )
    }

    /// Build Compute Engine API URL for a project
    pub fn compute_url(&self, project: &str, path: &str) -> String {
        self.service_url("compute", &format!("projects/{}/{}", project, path))
    }

    /// Build Resource Manager API URL
    pub fn resourcemanager_url(&self, path: &str) -> String {
        self.service_url("cloudresourcemanager", path)
    }
}
