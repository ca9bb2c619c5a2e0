//! Fan-Out Orchestrator
//!
//! Runs one logical listing as a sequence of per-scope listings that share a
//! single filter string and a single row budget. Scopes where the service is
//! disabled, denied or missing are skipped; any other failure aborts the run.
//! A 404 on the only scope of a listing is an error, not an empty result.

use super::error::{ErrorClass, ErrorPolicy, Result};
use super::filter::{compile, FieldMap, FilterPredicate, FilterValue, Operator, PredicateSet};
use super::gate::RateGate;
use super::paginate::{list_scope, Flow, ListMode, PageSource, RowBudget, RowSink};
use super::scope::{Granularity, ScopeEnumerator};
use std::sync::Arc;

/// Outcome of a fan-out run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Scopes listed to completion (or until the budget ran out).
    pub scopes_listed: usize,
    /// Tokens of scopes skipped under the error policy.
    pub scopes_skipped: Vec<String>,
    /// Rows handed to the sink.
    pub rows: u64,
    /// The sink asked to stop.
    pub stopped: bool,
}

/// Per-connection orchestrator: scope enumeration, rate gate and error policy.
#[derive(Clone)]
pub struct FanOut {
    enumerator: ScopeEnumerator,
    gate: Arc<dyn RateGate>,
    policy: ErrorPolicy,
}

impl FanOut {
    pub fn new(enumerator: ScopeEnumerator, gate: Arc<dyn RateGate>, policy: ErrorPolicy) -> Self {
        Self {
            enumerator,
            gate,
            policy,
        }
    }

    /// List every applicable scope into `sink` until the budget or the scopes
    /// run out.
    pub async fn run<S, K>(
        &self,
        granularity: &Granularity,
        predicates: &PredicateSet,
        fields: &FieldMap,
        budget: &mut RowBudget,
        source: &S,
        sink: &mut K,
    ) -> Result<FanOutReport>
    where
        S: PageSource + ?Sized,
        K: RowSink<S::Item> + ?Sized,
    {
        self.execute(granularity, predicates, fields, budget, source, sink, ListMode::List)
            .await
    }

    /// Fetch one resource by identifier.
    ///
    /// This is a listing with an exact-match predicate on `id_column`. When the
    /// predicate can be pushed down the budget is one row; otherwise rows are
    /// scanned until `matches` accepts one. An empty identifier returns `None`
    /// without touching the provider.
    pub async fn get<S, M>(
        &self,
        granularity: &Granularity,
        id_column: &str,
        id: &str,
        fields: &FieldMap,
        source: &S,
        matches: M,
    ) -> Result<Option<S::Item>>
    where
        S: PageSource + ?Sized,
        M: Fn(&S::Item) -> bool,
    {
        if id.trim().is_empty() {
            tracing::debug!(id_column, "Empty identifier, skipping lookup");
            return Ok(None);
        }

        let predicates: PredicateSet = std::iter::once(FilterPredicate::new(
            id_column,
            Operator::Eq,
            FilterValue::String(id.to_string()),
        ))
        .collect();

        let mut budget = if compile(&predicates, fields).is_empty() {
            RowBudget::unbounded()
        } else {
            RowBudget::limited(1)
        };

        let mut found = None;
        let mut sink = |item: S::Item| {
            if matches(&item) {
                found = Some(item);
                Flow::Stop
            } else {
                Flow::Continue
            }
        };
        self.execute(
            granularity,
            &predicates,
            fields,
            &mut budget,
            source,
            &mut sink,
            ListMode::Get,
        )
        .await?;

        Ok(found)
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute<S, K>(
        &self,
        granularity: &Granularity,
        predicates: &PredicateSet,
        fields: &FieldMap,
        budget: &mut RowBudget,
        source: &S,
        sink: &mut K,
        mode: ListMode,
    ) -> Result<FanOutReport>
    where
        S: PageSource + ?Sized,
        K: RowSink<S::Item> + ?Sized,
    {
        let scopes = self.enumerator.enumerate(granularity).await?;
        let filter = compile(predicates, fields);
        tracing::debug!(scopes = scopes.len(), filter = %filter, "Starting fan-out");

        let mut report = FanOutReport::default();
        let mut rows = 0u64;
        let mut counted = |item: S::Item| {
            rows += 1;
            sink.emit(item)
        };

        for scope in &scopes {
            if budget.is_exhausted() {
                tracing::debug!(%scope, "Row budget exhausted, not listing further scopes");
                break;
            }

            match list_scope(scope, &filter, budget, source, &*self.gate, &mut counted, mode).await {
                Ok(flow) => {
                    report.scopes_listed += 1;
                    if flow == Flow::Stop {
                        report.stopped = true;
                        break;
                    }
                },
                Err(err) => {
                    let class = self.policy.classify(&err);
                    // With nothing else to list, a missing scope is a missing resource.
                    let sole_scope_missing = class == ErrorClass::NotFound
                        && mode == ListMode::List
                        && scopes.len() == 1;
                    if !class.is_recoverable() || sole_scope_missing {
                        tracing::error!(%scope, error = %err, "Listing failed");
                        return Err(err);
                    }
                    tracing::warn!(%scope, %class, error = %err, "Skipping scope");
                    report.scopes_skipped.push(scope.token().to_string());
                },
            }
        }

        report.rows = rows;
        tracing::info!(
            listed = report.scopes_listed,
            skipped = report.scopes_skipped.len(),
            rows = report.rows,
            "Fan-out complete"
        );
        Ok(report)
    }
}
