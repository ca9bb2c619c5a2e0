//! Resource Fetcher
//!
//! Serves pages of registry resources from Google REST list endpoints.

use super::registry::ResourceDef;
use crate::engine::{ListError, Page, PageRequest, PageSource, Result, Scope};
use crate::gcp::client::GcpClient;
use async_trait::async_trait;
use serde_json::{Map, Value};
use url::Url;

/// Column holding the scope a row was listed from
pub const LOCATION_COLUMN: &str = "location";

/// [`PageSource`] for one resource type of one project
#[derive(Clone)]
pub struct RestSource {
    client: GcpClient,
    def: ResourceDef,
    project: String,
    common: Map<String, Value>,
}

impl RestSource {
    pub fn new(client: GcpClient, def: ResourceDef, project: impl Into<String>) -> Self {
        Self {
            client,
            def,
            project: project.into(),
            common: Map::new(),
        }
    }

    /// Columns added to every row that does not already carry them
    pub fn with_common_columns(mut self, common: Map<String, Value>) -> Self {
        self.common = common;
        self
    }

    fn uses_aggregated_path(&self, scope: &Scope) -> bool {
        scope.is_aggregated() && self.def.aggregated_path.is_some()
    }

    fn substitute(&self, template: &str, scope: &Scope) -> String {
        template
            .replace("{project}", &urlencoding::encode(&self.project))
            .replace("{scope}", &urlencoding::encode(scope.token()))
    }

    /// Full URL of one page request
    fn page_url(&self, scope: &Scope, request: &PageRequest<'_>) -> Result<Url> {
        let template = match &self.def.aggregated_path {
            Some(path) if scope.is_aggregated() => path,
            _ => &self.def.list_path,
        };
        let path = self.substitute(template, scope);
        let raw = self.client.service_url(&self.def.service, &path);

        let mut url = Url::parse(&raw)
            .map_err(|e| ListError::Config(format!("Invalid API URL '{}': {}", raw, e)))?;

        let mut pairs: Vec<(&str, String)> = self
            .def
            .params
            .iter()
            .map(|(name, value)| (name.as_str(), value.replace("{project}", &self.project)))
            .collect();
        if let Some(param) = &self.def.page_size_param {
            pairs.push((param.as_str(), request.page_size.to_string()));
        }
        if let Some(cursor) = request.cursor {
            pairs.push(("pageToken", cursor.to_string()));
        }
        if let Some(param) = &self.def.filter_param {
            if !request.filter.is_empty() {
                pairs.push((param.as_str(), request.filter.to_string()));
            }
        }
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }

        Ok(url)
    }

    /// Rows of a response, each paired with the location it belongs to
    fn extract_rows(&self, response: &Value, scope: &Scope) -> Vec<(String, Value)> {
        if self.uses_aggregated_path(scope) {
            let kind = self
                .def
                .aggregated_path
                .as_deref()
                .map(extract_short_name)
                .unwrap_or_default();
            return flatten_aggregated(response, &kind);
        }

        let location = scope.token().to_string();

        extract_items(response, &self.def.response_path)
            .into_iter()
            .map(|item| (location.clone(), item))
            .collect()
    }

    fn enrich(&self, mut item: Value, location: String) -> Value {
        if let Value::Object(ref mut map) = item {
            for (column, value) in &self.common {
                map.entry(column.clone()).or_insert_with(|| value.clone());
            }
            map.entry(LOCATION_COLUMN.to_string())
                .or_insert(Value::String(location));
        }
        item
    }
}

#[async_trait]
impl PageSource for RestSource {
    type Item = Value;

    fn max_page_size(&self) -> u32 {
        self.def.max_page_size
    }

    async fn fetch_page(&self, scope: &Scope, request: PageRequest<'_>) -> Result<Page<Value>> {
        let url = self.page_url(scope, &request)?;
        let response = self.client.get(url.as_str()).await?;

        let items = self
            .extract_rows(&response, scope)
            .into_iter()
            .map(|(location, item)| self.enrich(item, location))
            .collect();

        let next_cursor = response
            .get("nextPageToken")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(Page::new(items, next_cursor))
    }
}

/// Extract the item array at a dot-notation `path`
fn extract_items(response: &Value, path: &str) -> Vec<Value> {
    if path.is_empty() {
        return response.as_array().cloned().unwrap_or_default();
    }

    let mut current = response;
    for part in path.split('.') {
        current = match current.get(part) {
            Some(v) => v,
            None => return vec![],
        };
    }

    current.as_array().cloned().unwrap_or_default()
}

/// Flatten `{"items": {"zones/a": {"<kind>": [..]}, "zones/b": {"warning": ..}}}`
/// in the order the provider returned the scopes; scopes carrying only a
/// warning contribute nothing
fn flatten_aggregated(response: &Value, kind: &str) -> Vec<(String, Value)> {
    let Some(scopes) = response.get("items").and_then(|v| v.as_object()) else {
        return vec![];
    };

    scopes
        .iter()
        .flat_map(|(scope_key, entry)| {
            let location = extract_short_name(scope_key);
            entry
                .get(kind)
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(move |item| (location.clone(), item))
        })
        .collect()
}

/// Extract short name from GCP resource URL
/// e.g., "https://www.googleapis.com/compute/v1/projects/my-project/zones/us-central1-a" -> "us-central1-a"
pub fn extract_short_name(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

/// Walk a dotted path (`disks.0.sizeGb`) into a row
pub fn lookup_json_path<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(item, |current, part| match part.parse::<usize>() {
        Ok(idx) => current.get(idx),
        Err(_) => current.get(part),
    })
}

/// Extract a value from JSON using a dot-notation path
pub fn extract_json_value(item: &Value, path: &str) -> String {
    let Some(current) = lookup_json_path(item, path) else {
        return "-".to_string();
    };

    match current {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) => format!("[{} items]", arr.len()),
        Value::Object(_) => "[object]".to_string(),
    }
}
