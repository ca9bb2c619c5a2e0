//! Adaptive Paginated Lister
//!
//! Drives page fetches for one scope. The requested page size follows the
//! remaining row budget so a `LIMIT`-bounded query never asks the provider for
//! rows it will not return, and no page is fetched once the budget is spent.
//!
//! Items are streamed to a [`RowSink`] one at a time in provider order. The
//! sink can stop the listing after any row, including mid-page.

use super::error::Result;
use super::gate::RateGate;
use super::scope::Scope;
use async_trait::async_trait;

/// Rows still wanted by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBudget {
    limit: Option<u64>,
    remaining: u64,
}

impl RowBudget {
    pub fn unbounded() -> Self {
        Self {
            limit: None,
            remaining: u64::MAX,
        }
    }

    pub fn limited(limit: u64) -> Self {
        Self {
            limit: Some(limit),
            remaining: limit,
        }
    }

    /// `None` means unbounded.
    pub fn from_limit(limit: Option<u64>) -> Self {
        limit.map_or_else(Self::unbounded, Self::limited)
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Remaining rows, `None` when unbounded.
    pub fn remaining(&self) -> Option<u64> {
        self.limit.map(|_| self.remaining)
    }

    pub fn is_exhausted(&self) -> bool {
        self.limit.is_some() && self.remaining == 0
    }

    /// Page size to request next: never above `max`, never above what is left.
    pub fn page_size(&self, max: u32) -> u32 {
        match self.limit {
            Some(_) => self.remaining.min(u64::from(max)) as u32,
            None => max,
        }
    }

    fn consume(&mut self) {
        if self.limit.is_some() {
            self.remaining = self.remaining.saturating_sub(1);
        }
    }
}

/// Parameters of one page fetch.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub cursor: Option<&'a str>,
    pub page_size: u32,
    pub filter: &'a str,
}

/// One page of provider results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), None)
    }

    /// Continuation token, with an empty string treated as the last page.
    pub fn cursor(&self) -> Option<&str> {
        self.next_cursor.as_deref().filter(|c| !c.is_empty())
    }
}

/// A remote listing operation for one resource type.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    /// Largest page the provider accepts.
    fn max_page_size(&self) -> u32;

    async fn fetch_page(&self, scope: &Scope, request: PageRequest<'_>) -> Result<Page<Self::Item>>;
}

/// Whether the consumer wants more rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Receives rows one at a time.
pub trait RowSink<T> {
    fn emit(&mut self, item: T) -> Flow;
}

impl<T, F> RowSink<T> for F
where
    F: FnMut(T) -> Flow,
{
    fn emit(&mut self, item: T) -> Flow {
        self(item)
    }
}

/// What a provider 404 means for this listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListMode {
    /// 404 is an error.
    #[default]
    List,
    /// Get-by-identifier: 404 is zero rows.
    Get,
}

/// List one scope into `sink`.
///
/// Returns [`Flow::Stop`] when the sink asked to stop, [`Flow::Continue`] when
/// the provider ran out of pages or the budget ran out. Fetch errors are
/// returned unchanged.
pub async fn list_scope<S, G, K>(
    scope: &Scope,
    filter: &str,
    budget: &mut RowBudget,
    source: &S,
    gate: &G,
    sink: &mut K,
    mode: ListMode,
) -> Result<Flow>
where
    S: PageSource + ?Sized,
    G: RateGate + ?Sized,
    K: RowSink<S::Item> + ?Sized,
{
    let max_page_size = source.max_page_size().max(1);
    let mut cursor: Option<String> = None;
    let mut page_size = budget.page_size(max_page_size);
    let mut pages = 0usize;

    loop {
        if budget.is_exhausted() {
            tracing::debug!(%scope, pages, "Row budget exhausted");
            return Ok(Flow::Continue);
        }

        gate.ready().await;

        let request = PageRequest {
            cursor: cursor.as_deref(),
            page_size,
            filter,
        };
        tracing::debug!(%scope, page_size, cursor = ?request.cursor, "Fetching page");

        let page = match source.fetch_page(scope, request).await {
            Ok(page) => page,
            Err(err) if mode == ListMode::Get && err.is_not_found() => {
                tracing::debug!(%scope, "Not found, returning no rows");
                return Ok(Flow::Continue);
            },
            Err(err) => return Err(err),
        };
        pages += 1;

        let next = page.cursor().map(str::to_string);
        for item in page.items {
            let flow = sink.emit(item);
            budget.consume();

            if flow == Flow::Stop {
                tracing::debug!(%scope, pages, "Consumer stopped listing");
                return Ok(Flow::Stop);
            }
            if budget.is_exhausted() {
                tracing::debug!(%scope, pages, "Row budget exhausted");
                return Ok(Flow::Continue);
            }
        }

        match next {
            Some(next) => cursor = Some(next),
            None => {
                tracing::debug!(%scope, pages, "Last page reached");
                return Ok(Flow::Continue);
            },
        }

        page_size = budget.page_size(max_page_size);
    }
}
