//! Connection
//!
//! Everything one configured session shares: the authenticated client, the
//! request limiter, the resolution cache and the error policy. Cloning a
//! connection is cheap and clones share state, so concurrent listings see the
//! same cache and the same rate budget.

use crate::config::Config;
use crate::engine::{
    ErrorPolicy, FanOut, FanOutReport, Flow, ListError, PredicateSet, RateGate,
    RequestLimiter, ResolutionCache, Result, RowBudget, RowSink, ScopeEnumerator,
};
use crate::gcp::auth::GcpCredentials;
use crate::gcp::client::GcpClient;
use crate::gcp::locations::GcpLocations;
use crate::gcp::projects::get_project;
use crate::resource::{
    extract_short_name, get_resource, lookup_json_path, ResourceDef, RestSource,
};
use anyhow::Context;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

const PROJECT_ID_KEY: &str = "project_id";
const DEFAULT_REGION_KEY: &str = "default_region";
const COMMON_COLUMNS_KEY: &str = "common_columns";

/// Values derived once per connection
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResolvedContext {
    pub project_id: String,
    pub default_region: String,
    pub common_columns: Map<String, Value>,
}

/// Shared session against one project
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    client: GcpClient,
    config: Config,
    cache: ResolutionCache,
    limiter: Arc<RequestLimiter>,
    policy: ErrorPolicy,
}

impl Connection {
    /// Authenticate and build a connection from `config`
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let credentials = match &config.access_token {
            Some(token) => GcpCredentials::with_static_token(token.clone()),
            None => GcpCredentials::new().await?,
        };
        let client =
            GcpClient::with_credentials(credentials).context("Failed to create GCP client")?;

        Ok(Self::with_client(client, config))
    }

    /// Build a connection around an existing client
    pub fn with_client(client: GcpClient, config: Config) -> Self {
        let client = match &config.api_endpoint {
            Some(endpoint) => client.with_endpoint(endpoint.clone()),
            None => client,
        };
        let limiter = Arc::new(RequestLimiter::from_config(config.requests_per_second));
        let policy = config.error_policy();

        Self {
            inner: Arc::new(ConnectionInner {
                client,
                config,
                cache: ResolutionCache::new(),
                limiter,
                policy,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.inner.cache
    }

    /// Active project: configuration, gcloud defaults, then the credentials
    pub async fn project_id(&self) -> Result<String> {
        let config = &self.inner.config;
        let credentials = &self.inner.client.credentials;

        self.inner
            .cache
            .get_or_compute(PROJECT_ID_KEY, || async move {
                if let Some(project) = config.effective_project() {
                    return Ok(project);
                }
                credentials.project_id().await.ok_or_else(|| {
                    ListError::Config(
                        "No project configured. Pass --project or run 'gcloud config set project'"
                            .to_string(),
                    )
                })
            })
            .await
    }

    pub async fn default_region(&self) -> Result<String> {
        let config = &self.inner.config;
        self.inner
            .cache
            .get_or_compute(DEFAULT_REGION_KEY, || async move { Ok(config.effective_region()) })
            .await
    }

    /// Columns stamped on every row: `project` and `project_number`
    pub async fn common_columns(&self) -> Result<Map<String, Value>> {
        let project = self.project_id().await?;
        let client = &self.inner.client;
        let policy = &self.inner.policy;

        self.inner
            .cache
            .get_or_compute(COMMON_COLUMNS_KEY, || async move {
                let number = match get_project(client, &project).await {
                    Ok(details) => Value::String(details.project_number),
                    Err(e) if policy.classify(&e).is_recoverable() => {
                        tracing::warn!(project = %project, "Project number unavailable: {}", e);
                        Value::Null
                    },
                    Err(e) => return Err(e),
                };

                let mut columns = Map::new();
                columns.insert("project".to_string(), Value::String(project));
                columns.insert("project_number".to_string(), number);
                Ok(columns)
            })
            .await
    }

    pub async fn context(&self) -> Result<ResolvedContext> {
        Ok(ResolvedContext {
            project_id: self.project_id().await?,
            default_region: self.default_region().await?,
            common_columns: self.common_columns().await?,
        })
    }

    /// Stream rows of resource type `key` into `sink`
    ///
    /// A limit of zero returns without resolving anything.
    pub async fn list<K>(
        &self,
        key: &str,
        predicates: &PredicateSet,
        limit: Option<u64>,
        sink: &mut K,
    ) -> Result<FanOutReport>
    where
        K: RowSink<Value> + ?Sized,
    {
        let def = lookup(key)?;
        let mut budget = RowBudget::from_limit(limit);
        if budget.is_exhausted() {
            return Ok(FanOutReport::default());
        }

        let fields = def.pushdown_fields();
        let residual = predicates.residual(&fields);
        let (fan_out, source) = self.prepare(def).await?;

        if residual.is_empty() {
            return fan_out
                .run(&def.granularity, predicates, &fields, &mut budget, &source, sink)
                .await;
        }

        tracing::debug!(
            resource = key,
            predicates = residual.len(),
            "Evaluating predicates on returned rows"
        );

        // The limit counts matching rows, so the provider side runs unbounded.
        let mut matched: u64 = 0;
        let mut consumer_stopped = false;
        let mut filtered = |row: Value| {
            let keep = residual.iter().all(|predicate| {
                let path = def
                    .filters
                    .get(&predicate.column)
                    .map_or(predicate.column.as_str(), |field| field.field.as_str());
                predicate.matches(lookup_json_path(&row, path))
            });
            if !keep {
                return Flow::Continue;
            }

            matched += 1;
            if sink.emit(row) == Flow::Stop {
                consumer_stopped = true;
                return Flow::Stop;
            }
            if limit.is_some_and(|limit| matched >= limit) {
                Flow::Stop
            } else {
                Flow::Continue
            }
        };

        let mut provider_budget = RowBudget::unbounded();
        let mut report = fan_out
            .run(
                &def.granularity,
                predicates,
                &fields,
                &mut provider_budget,
                &source,
                &mut filtered,
            )
            .await?;
        report.rows = matched;
        report.stopped = consumer_stopped;
        Ok(report)
    }

    /// Fetch one resource of type `key` by identifier
    ///
    /// The identifier matches the resource's id field either in full or by its
    /// last path segment.
    pub async fn get(&self, key: &str, id: &str) -> Result<Option<Value>> {
        let def = lookup(key)?;
        if id.trim().is_empty() {
            return Ok(None);
        }

        let fields = def.pushdown_fields();
        let (fan_out, source) = self.prepare(def).await?;
        let id_field = def.id_field.as_str();

        fan_out
            .get(&def.granularity, id_field, id, &fields, &source, |row: &Value| {
                row.get(id_field)
                    .and_then(|v| v.as_str())
                    .is_some_and(|value| value == id || extract_short_name(value) == id)
            })
            .await
    }

    /// Forget every resolved value; the next call resolves afresh
    pub fn close(&self) {
        self.inner.cache.clear();
    }

    async fn prepare(&self, def: &ResourceDef) -> Result<(FanOut, RestSource)> {
        let project = self.project_id().await?;
        let common = self.common_columns().await?;

        let gate: Arc<dyn RateGate> = self.inner.limiter.clone();
        let discovery = Arc::new(GcpLocations::new(
            self.inner.client.clone(),
            project.clone(),
            gate.clone(),
        ));
        let enumerator = ScopeEnumerator::new(discovery, self.inner.cache.clone())
            .with_regions(self.inner.config.regions.clone());
        let fan_out = FanOut::new(enumerator, gate, self.inner.policy.clone());

        let source = RestSource::new(self.inner.client.clone(), def.clone(), project)
            .with_common_columns(common);

        Ok((fan_out, source))
    }
}

fn lookup(key: &str) -> Result<&'static ResourceDef> {
    get_resource(key).ok_or_else(|| ListError::UnknownResource(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(config: Config) -> Connection {
        let client =
            GcpClient::with_credentials(GcpCredentials::with_static_token("t")).unwrap();
        Connection::with_client(client, config)
    }

    #[tokio::test]
    async fn test_project_id_from_config_is_cached() {
        let conn = connection(Config {
            project: Some("alpha-project".into()),
            ..Config::default()
        });

        let (a, b) = tokio::join!(conn.project_id(), conn.project_id());
        assert_eq!(a.unwrap(), "alpha-project");
        assert_eq!(b.unwrap(), "alpha-project");
        assert!(conn.cache().contains("project_id"));

        conn.close();
        assert!(!conn.cache().contains("project_id"));
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let conn = connection(Config::default());
        let err = conn.get("no-such-thing", "x").await.unwrap_err();
        assert!(matches!(err, ListError::UnknownResource(ref k) if k == "no-such-thing"));
    }

    #[tokio::test]
    async fn test_zero_limit_resolves_nothing() {
        let conn = connection(Config::default());
        let mut sink = |_row: Value| Flow::Continue;
        let report = conn
            .list("compute-instances", &PredicateSet::new(), Some(0), &mut sink)
            .await
            .unwrap();

        assert_eq!(report, FanOutReport::default());
        assert!(!conn.cache().contains("project_id"));
    }

    #[tokio::test]
    async fn test_empty_id_resolves_nothing() {
        let conn = connection(Config::default());
        assert_eq!(conn.get("compute-instances", "  ").await.unwrap(), None);
        assert!(!conn.cache().contains("project_id"));
    }

    #[tokio::test]
    async fn test_default_region_from_config() {
        let conn = connection(Config {
            region: Some("europe-west1".into()),
            ..Config::default()
        });
        assert_eq!(conn.default_region().await.unwrap(), "europe-west1");
    }
}
