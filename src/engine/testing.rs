//! In-memory collaborators for engine tests.

use super::error::{ListError, Result};
use super::gate::RateGate;
use super::paginate::{Page, PageRequest, PageSource};
use super::scope::{LocationDiscovery, Scope};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A page fetch as seen by the fake provider.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub scope: String,
    pub cursor: Option<String>,
    pub page_size: u32,
    pub filter: String,
}

/// Provider serving fixed items per scope, paged by offset cursors.
pub struct FakeSource {
    max_page_size: u32,
    honor_page_size: bool,
    items: HashMap<String, Vec<&'static str>>,
    failures: HashMap<String, u16>,
    log: Mutex<Vec<RecordedRequest>>,
}

impl FakeSource {
    pub fn new(max_page_size: u32) -> Self {
        Self {
            max_page_size,
            honor_page_size: true,
            items: HashMap::new(),
            failures: HashMap::new(),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn scope(mut self, token: &str, items: &[&'static str]) -> Self {
        self.items.insert(token.to_string(), items.to_vec());
        self
    }

    pub fn failing(mut self, token: &str, status: u16) -> Self {
        self.failures.insert(token.to_string(), status);
        self
    }

    pub fn ignoring_page_size(mut self) -> Self {
        self.honor_page_size = false;
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn page_sizes(&self, token: &str) -> Vec<u32> {
        self.requests()
            .into_iter()
            .filter(|r| r.scope == token)
            .map(|r| r.page_size)
            .collect()
    }

    pub fn fetched_scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = Vec::new();
        for request in self.requests() {
            if !scopes.contains(&request.scope) {
                scopes.push(request.scope);
            }
        }
        scopes
    }
}

#[async_trait]
impl PageSource for FakeSource {
    type Item = &'static str;

    fn max_page_size(&self) -> u32 {
        self.max_page_size
    }

    async fn fetch_page(&self, scope: &Scope, request: PageRequest<'_>) -> Result<Page<Self::Item>> {
        self.log.lock().unwrap().push(RecordedRequest {
            scope: scope.token().to_string(),
            cursor: request.cursor.map(str::to_string),
            page_size: request.page_size,
            filter: request.filter.to_string(),
        });

        if let Some(status) = self.failures.get(scope.token()) {
            return Err(ListError::Api {
                status: *status,
                code: None,
                reason: None,
                message: format!("scope {} failed", scope),
            });
        }

        let Some(items) = self.items.get(scope.token()) else {
            return Ok(Page::empty());
        };

        let offset: usize = request.cursor.map_or(0, |c| c.parse().unwrap());
        let take = if self.honor_page_size {
            request.page_size as usize
        } else {
            items.len()
        };
        let end = (offset + take).min(items.len());
        let next = (end < items.len()).then(|| end.to_string());

        Ok(Page::new(items[offset..end].to_vec(), next))
    }
}

/// Gate that counts how often it was awaited.
#[derive(Debug, Default)]
pub struct CountingGate {
    count: AtomicUsize,
}

impl CountingGate {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateGate for CountingGate {
    async fn ready(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Discovery with fixed answers and a call counter.
#[derive(Debug, Default)]
pub struct FakeDiscovery {
    regions: Vec<String>,
    zones: Vec<String>,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeDiscovery {
    pub fn with_regions(regions: &[&str]) -> Self {
        Self {
            regions: regions.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_zones(zones: &[&str]) -> Self {
        Self {
            zones: zones.iter().map(|z| z.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self, names: &[String]) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ListError::Api {
                status: 503,
                code: Some("UNAVAILABLE".into()),
                reason: None,
                message: "discovery unavailable".into(),
            });
        }
        Ok(names.to_vec())
    }
}

#[async_trait]
impl LocationDiscovery for FakeDiscovery {
    async fn regions(&self) -> Result<Vec<String>> {
        self.answer(&self.regions)
    }

    async fn zones(&self) -> Result<Vec<String>> {
        self.answer(&self.zones)
    }

    async fn locations(&self, _service: &str) -> Result<Vec<String>> {
        self.answer(&self.regions)
    }
}
