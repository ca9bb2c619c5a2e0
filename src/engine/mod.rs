//! Resource Listing Engine
//!
//! Provider-agnostic machinery shared by every resource type: where to look,
//! how to page, how fast to go, what to memoize and what to push down.
//!
//! # Module Structure
//!
//! - [`scope`] - Scope enumeration (global, aggregated, per region/zone/location)
//! - [`filter`] - Compiles column predicates into provider filter expressions
//! - [`cache`] - Connection-scoped single-flight memoization
//! - [`paginate`] - Budget-aware paginated listing of one scope
//! - [`matrix`] - Fans one listing out over every scope
//! - [`gate`] - Rate limiting awaited before every page fetch
//! - [`error`] - Error taxonomy and per-scope recovery policy

pub mod cache;
pub mod error;
pub mod filter;
pub mod gate;
pub mod matrix;
pub mod paginate;
pub mod scope;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::ResolutionCache;
pub use error::{ErrorClass, ErrorPolicy, ListError, Result};
pub use filter::{
    compile, FieldKind, FieldMap, FilterField, FilterPredicate, FilterValue, Operator,
    PredicateSet,
};
pub use gate::{RateGate, RequestLimiter, Ungated};
pub use matrix::{FanOut, FanOutReport};
pub use paginate::{list_scope, Flow, ListMode, Page, PageRequest, PageSource, RowBudget, RowSink};
pub use scope::{
    Granularity, LocationDiscovery, Scope, ScopeEnumerator, ScopeKind, ScopeSet,
    AGGREGATED_TOKEN, GLOBAL_TOKEN,
};
