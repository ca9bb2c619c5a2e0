//! GCP Location Discovery
//!
//! Region, zone and per-service location names for scope fan-out.

use super::client::GcpClient;
use crate::engine::{LocationDiscovery, RateGate, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Discovers locations of one project through the Compute and service
/// `locations` APIs, following every page.
#[derive(Clone)]
pub struct GcpLocations {
    client: GcpClient,
    project: String,
    gate: Arc<dyn RateGate>,
}

impl GcpLocations {
    pub fn new(client: GcpClient, project: impl Into<String>, gate: Arc<dyn RateGate>) -> Self {
        Self {
            client,
            project: project.into(),
            gate,
        }
    }

    /// Collect `name_field` of every element of `items_field` across all pages
    async fn collect_names(&self, url: &str, items_field: &str, name_field: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            self.gate.ready().await;

            let page_url = match &page_token {
                Some(token) => format!("{}?pageToken={}", url, urlencoding::encode(token)),
                None => url.to_string(),
            };
            let response = self.client.get(&page_url).await?;

            names.extend(extract_names(&response, items_field, name_field));

            page_token = response
                .get("nextPageToken")
                .and_then(|v| v.as_str())
                .filter(|token| !token.is_empty())
                .map(str::to_string);

            if page_token.is_none() {
                break;
            }
        }

        tracing::debug!(url, count = names.len(), "Discovered locations");
        Ok(names)
    }
}

fn extract_names(response: &Value, items_field: &str, name_field: &str) -> Vec<String> {
    response
        .get(items_field)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(name_field).and_then(|v| v.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl LocationDiscovery for GcpLocations {
    async fn regions(&self) -> Result<Vec<String>> {
        let url = self.client.compute_url(&self.project, "regions");
        self.collect_names(&url, "items", "name").await
    }

    async fn zones(&self) -> Result<Vec<String>> {
        let url = self.client.compute_url(&self.project, "zones");
        self.collect_names(&url, "items", "name").await
    }

    async fn locations(&self, service: &str) -> Result<Vec<String>> {
        let url = self
            .client
            .service_url(service, &format!("projects/{}/locations", self.project));
        self.collect_names(&url, "locations", "locationId").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_names() {
        let response = json!({
            "items": [
                {"name": "us-central1", "status": "UP"},
                {"name": "europe-west1"},
                {"status": "nameless"}
            ]
        });
        assert_eq!(
            extract_names(&response, "items", "name"),
            vec!["us-central1", "europe-west1"]
        );
        assert!(extract_names(&json!({}), "locations", "locationId").is_empty());
    }
}
