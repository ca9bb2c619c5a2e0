//! Qualifier Filter Compiler
//!
//! Turns typed column predicates into the conjunctive `filter` expression the
//! Google list APIs accept, e.g. `status = "RUNNING" cpuPlatform != "x"`.
//!
//! Pushdown is best effort. Predicates on unknown columns, unsupported
//! operators and mistyped values are dropped here and re-checked by the query
//! layer on the returned rows.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// Comparison operator of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Operator {
    /// Parse a SQL-style operator. `!=` is accepted as a synonym for `<>`.
    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(Operator::Eq),
            "<>" | "!=" => Some(Operator::Ne),
            "<" => Some(Operator::Lt),
            ">" => Some(Operator::Gt),
            "<=" => Some(Operator::Le),
            ">=" => Some(Operator::Ge),
            _ => None,
        }
    }

    /// Operator as written in a provider filter expression.
    fn provider_symbol(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::Ne => "<>",
            other => other.provider_symbol(),
        };
        f.write_str(symbol)
    }
}

/// Type of a filterable provider field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Int64,
    Bool,
    Timestamp,
}

impl FieldKind {
    /// Whether the provider grammar accepts `op` on a field of this kind.
    pub fn supports(self, op: Operator) -> bool {
        match self {
            FieldKind::String | FieldKind::Bool => matches!(op, Operator::Eq | Operator::Ne),
            FieldKind::Int64 | FieldKind::Timestamp => true,
        }
    }

    /// Interpret a raw literal as a value of this kind.
    pub fn coerce(self, raw: &str) -> Option<FilterValue> {
        match self {
            FieldKind::String => Some(FilterValue::String(raw.to_string())),
            FieldKind::Int64 => raw.parse().ok().map(FilterValue::Int64),
            FieldKind::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" => Some(FilterValue::Bool(true)),
                "false" => Some(FilterValue::Bool(false)),
                _ => None,
            },
            FieldKind::Timestamp => DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|ts| FilterValue::Timestamp(ts.with_timezone(&Utc))),
        }
    }
}

/// Provider-side name and type of a filterable column.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FilterField {
    pub field: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
}

impl FilterField {
    pub fn new(field: &str, kind: FieldKind) -> Self {
        Self {
            field: field.to_string(),
            kind,
        }
    }
}

/// Column name -> provider field.
pub type FieldMap = HashMap<String, FilterField>;

/// Operand of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    String(String),
    Int64(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl FilterValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FilterValue::String(_) => FieldKind::String,
            FilterValue::Int64(_) => FieldKind::Int64,
            FilterValue::Bool(_) => FieldKind::Bool,
            FilterValue::Timestamp(_) => FieldKind::Timestamp,
        }
    }

    /// Best guess at the type of an untyped literal.
    pub fn infer(raw: &str) -> Self {
        [FieldKind::Bool, FieldKind::Int64, FieldKind::Timestamp]
            .into_iter()
            .find_map(|kind| kind.coerce(raw))
            .unwrap_or_else(|| FilterValue::String(raw.to_string()))
    }

    fn render(&self) -> String {
        match self {
            FilterValue::String(s) => quote(s),
            FilterValue::Int64(n) => n.to_string(),
            FilterValue::Bool(b) => b.to_string(),
            FilterValue::Timestamp(ts) => quote(&ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }

    /// Order a row value against this operand, coercing it to the operand's
    /// type. Int64 and bool values may arrive as JSON strings.
    fn compare(&self, actual: &Value) -> Option<Ordering> {
        match self {
            FilterValue::String(expected) => {
                let actual: Cow<str> = match actual {
                    Value::String(s) => Cow::Borrowed(s),
                    Value::Number(n) => Cow::Owned(n.to_string()),
                    Value::Bool(b) => Cow::Owned(b.to_string()),
                    _ => return None,
                };
                Some(actual.as_ref().cmp(expected.as_str()))
            },
            FilterValue::Int64(expected) => {
                let actual = match actual {
                    Value::String(s) => s.trim().parse::<i64>().ok()?,
                    other => other.as_i64()?,
                };
                Some(actual.cmp(expected))
            },
            FilterValue::Bool(expected) => {
                let actual = match actual {
                    Value::String(s) => s.trim().to_ascii_lowercase().parse::<bool>().ok()?,
                    other => other.as_bool()?,
                };
                Some(actual.cmp(expected))
            },
            FilterValue::Timestamp(expected) => {
                let actual = DateTime::parse_from_rfc3339(actual.as_str()?).ok()?;
                Some(actual.with_timezone(&Utc).cmp(expected))
            },
        }
    }
}

/// A single `column OP value` constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPredicate {
    pub column: String,
    pub operator: Operator,
    pub value: FilterValue,
}

impl FilterPredicate {
    pub fn new(column: &str, operator: Operator, value: FilterValue) -> Self {
        Self {
            column: column.to_string(),
            operator,
            value,
        }
    }

    /// Parse `column OP value`, typing the value from `fields` when the column
    /// is known and inferring it otherwise. Surrounding quotes are stripped.
    pub fn parse(expr: &str, fields: &FieldMap) -> Result<Self> {
        let Some(start) = expr.find(['=', '<', '>', '!']) else {
            bail!("Missing operator in predicate '{}'", expr);
        };

        let rest = &expr[start..];
        let (operator, width) = ["<=", ">=", "<>", "!="]
            .iter()
            .find(|symbol| rest.starts_with(*symbol))
            .and_then(|symbol| Operator::parse(symbol).map(|op| (op, 2)))
            .or_else(|| Operator::parse(&rest[..1]).map(|op| (op, 1)))
            .with_context(|| format!("Unsupported operator in predicate '{}'", expr))?;

        let column = expr[..start].trim();
        if column.is_empty() {
            bail!("Missing column in predicate '{}'", expr);
        }

        let raw = unquote(rest[width..].trim());
        let value = match fields.get(column) {
            Some(field) => field.kind.coerce(raw).with_context(|| {
                format!("Value '{}' is not a valid {:?} for '{}'", raw, field.kind, column)
            })?,
            None => FilterValue::infer(raw),
        };

        Ok(Self::new(column, operator, value))
    }

    /// Evaluate against a row's value. A missing or incomparable value never
    /// matches.
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        let Some(ordering) = actual.and_then(|value| self.value.compare(value)) else {
            return false;
        };

        match self.operator {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
        }
    }
}

/// Ordered predicates, unique per (column, operator).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredicateSet {
    predicates: Vec<FilterPredicate>,
}

impl PredicateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predicate. A second predicate for the same column and operator
    /// replaces the first value and keeps the first position.
    pub fn insert(&mut self, predicate: FilterPredicate) {
        let existing = self
            .predicates
            .iter_mut()
            .find(|p| p.column == predicate.column && p.operator == predicate.operator);

        match existing {
            Some(slot) => slot.value = predicate.value,
            None => self.predicates.push(predicate),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterPredicate> {
        self.predicates.iter()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// The predicates `compile` leaves out for `fields`. These have to be
    /// checked against each returned row.
    pub fn residual(&self, fields: &FieldMap) -> PredicateSet {
        self.predicates
            .iter()
            .filter(|predicate| pushed_down(predicate, fields).is_none())
            .cloned()
            .collect()
    }
}

impl FromIterator<FilterPredicate> for PredicateSet {
    fn from_iter<I: IntoIterator<Item = FilterPredicate>>(iter: I) -> Self {
        let mut set = PredicateSet::new();
        for predicate in iter {
            set.insert(predicate);
        }
        set
    }
}

/// Build the provider filter string, or `""` when nothing can be pushed down.
pub fn compile(predicates: &PredicateSet, fields: &FieldMap) -> String {
    predicates
        .iter()
        .filter_map(|predicate| pushed_down(predicate, fields))
        .collect::<Vec<_>>()
        .join(" ")
}

fn pushed_down(predicate: &FilterPredicate, fields: &FieldMap) -> Option<String> {
    let field = fields.get(&predicate.column)?;
    render_clause(predicate, field)
}

fn render_clause(predicate: &FilterPredicate, field: &FilterField) -> Option<String> {
    if predicate.value.kind() != field.kind || !field.kind.supports(predicate.operator) {
        tracing::trace!(
            column = %predicate.column,
            operator = %predicate.operator,
            "Predicate not pushed down"
        );
        return None;
    }

    Some(format!(
        "{} {} {}",
        field.field,
        predicate.operator.provider_symbol(),
        predicate.value.render()
    ))
}

fn quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

fn unquote(raw: &str) -> &str {
    ['"', '\'']
        .iter()
        .find_map(|q| raw.strip_prefix(*q).and_then(|r| r.strip_suffix(*q)))
        .unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fields(entries: &[(&str, &str, FieldKind)]) -> FieldMap {
        entries
            .iter()
            .map(|(column, field, kind)| (column.to_string(), FilterField::new(field, *kind)))
            .collect()
    }

    fn set(predicates: Vec<FilterPredicate>) -> PredicateSet {
        predicates.into_iter().collect()
    }

    #[test]
    fn test_string_equality_is_quoted() {
        let map = fields(&[("status", "state", FieldKind::String)]);
        let preds = set(vec![FilterPredicate::new(
            "status",
            Operator::Eq,
            FilterValue::String("READY".into()),
        )]);

        assert_eq!(compile(&preds, &map), r#"state = "READY""#);
    }

    #[test]
    fn test_bool_renders_unquoted() {
        let map = fields(&[("enable_cdn", "enableCdn", FieldKind::Bool)]);
        let preds = set(vec![FilterPredicate::new(
            "enable_cdn",
            Operator::Eq,
            FilterValue::Bool(true),
        )]);

        assert_eq!(compile(&preds, &map), "enableCdn = true");
    }

    #[test]
    fn test_compile_is_deterministic_and_ordered() {
        let map = fields(&[
            ("name", "name", FieldKind::String),
            ("cpus", "guestCpus", FieldKind::Int64),
            ("status", "status", FieldKind::String),
        ]);
        let preds = set(vec![
            FilterPredicate::new("status", Operator::Ne, FilterValue::String("STOPPED".into())),
            FilterPredicate::new("cpus", Operator::Ge, FilterValue::Int64(4)),
            FilterPredicate::new("name", Operator::Eq, FilterValue::String("web".into())),
        ]);

        let first = compile(&preds, &map);
        let second = compile(&preds, &map);
        assert_eq!(first, second);
        assert_eq!(first, r#"status != "STOPPED" guestCpus >= 4 name = "web""#);
    }

    #[test]
    fn test_unknown_column_and_unsupported_operator_are_dropped() {
        let map = fields(&[("enable_cdn", "enableCdn", FieldKind::Bool)]);
        let preds = set(vec![
            FilterPredicate::new("region", Operator::Eq, FilterValue::String("x".into())),
            FilterPredicate::new("enable_cdn", Operator::Gt, FilterValue::Bool(false)),
        ]);

        assert_eq!(compile(&preds, &map), "");
    }

    #[test]
    fn test_type_mismatch_is_dropped() {
        let map = fields(&[("cpus", "guestCpus", FieldKind::Int64)]);
        let preds = set(vec![FilterPredicate::new(
            "cpus",
            Operator::Eq,
            FilterValue::String("four".into()),
        )]);

        assert_eq!(compile(&preds, &map), "");
    }

    #[test]
    fn test_string_escaping() {
        let map = fields(&[("description", "description", FieldKind::String)]);
        let preds = set(vec![FilterPredicate::new(
            "description",
            Operator::Eq,
            FilterValue::String(r#"say "hi" \o/"#.into()),
        )]);

        assert_eq!(
            compile(&preds, &map),
            r#"description = "say \"hi\" \\o/""#
        );
    }

    #[test]
    fn test_timestamp_renders_quoted_rfc3339() {
        let map = fields(&[("created", "creationTimestamp", FieldKind::Timestamp)]);
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let preds = set(vec![FilterPredicate::new(
            "created",
            Operator::Lt,
            FilterValue::Timestamp(ts),
        )]);

        assert_eq!(
            compile(&preds, &map),
            r#"creationTimestamp < "2024-03-01T12:00:00Z""#
        );
    }

    #[test]
    fn test_duplicate_column_operator_last_wins() {
        let preds = set(vec![
            FilterPredicate::new("status", Operator::Eq, FilterValue::String("A".into())),
            FilterPredicate::new("name", Operator::Eq, FilterValue::String("n".into())),
            FilterPredicate::new("status", Operator::Eq, FilterValue::String("B".into())),
        ]);

        assert_eq!(preds.len(), 2);
        let first = preds.iter().next().unwrap();
        assert_eq!(first.value, FilterValue::String("B".into()));
    }

    #[test]
    fn test_parse_predicates() {
        let map = fields(&[
            ("enable_cdn", "enableCdn", FieldKind::Bool),
            ("label", "labels.env", FieldKind::String),
        ]);

        let p = FilterPredicate::parse("enable_cdn = TRUE", &map).unwrap();
        assert_eq!(p.operator, Operator::Eq);
        assert_eq!(p.value, FilterValue::Bool(true));

        let p = FilterPredicate::parse("label<>'123'", &map).unwrap();
        assert_eq!(p.operator, Operator::Ne);
        assert_eq!(p.value, FilterValue::String("123".into()));

        let p = FilterPredicate::parse("size >= 10", &map).unwrap();
        assert_eq!(p.operator, Operator::Ge);
        assert_eq!(p.value, FilterValue::Int64(10));

        assert!(FilterPredicate::parse("enable_cdn = maybe", &map).is_err());
        assert!(FilterPredicate::parse("no operator", &map).is_err());
        assert!(FilterPredicate::parse("= value", &map).is_err());
    }

    #[test]
    fn test_residual_keeps_what_compile_drops() {
        let map = fields(&[
            ("enable_cdn", "enableCdn", FieldKind::Bool),
            ("cpus", "guestCpus", FieldKind::Int64),
        ]);
        let preds = set(vec![
            FilterPredicate::new("enable_cdn", Operator::Eq, FilterValue::Bool(true)),
            FilterPredicate::new("enable_cdn", Operator::Gt, FilterValue::Bool(false)),
            FilterPredicate::new("cpus", Operator::Eq, FilterValue::String("four".into())),
            FilterPredicate::new("region", Operator::Eq, FilterValue::String("x".into())),
        ]);

        let residual = preds.residual(&map);
        let columns: Vec<_> = residual
            .iter()
            .map(|p| (p.column.as_str(), p.operator))
            .collect();
        assert_eq!(
            columns,
            vec![
                ("enable_cdn", Operator::Gt),
                ("cpus", Operator::Eq),
                ("region", Operator::Eq),
            ]
        );
        assert!(preds.residual(&FieldMap::new()).len() == preds.len());
    }

    #[test]
    fn test_matches_string_ordering() {
        let gt = FilterPredicate::new("status", Operator::Gt, FilterValue::String("RUNNING".into()));
        assert!(gt.matches(Some(&json!("STOPPED"))));
        assert!(!gt.matches(Some(&json!("RUNNING"))));
        assert!(!gt.matches(None));

        let ne = FilterPredicate::new("name", Operator::Ne, FilterValue::String("skip".into()));
        assert!(ne.matches(Some(&json!("keep"))));
        assert!(!ne.matches(Some(&json!("skip"))));
        assert!(!ne.matches(Some(&json!({"nested": true}))));
    }

    #[test]
    fn test_matches_coerces_row_values() {
        // int64 fields are serialized as strings by the REST APIs
        let size = FilterPredicate::new("size", Operator::Ge, FilterValue::Int64(100));
        assert!(size.matches(Some(&json!("100"))));
        assert!(size.matches(Some(&json!(250))));
        assert!(!size.matches(Some(&json!("10"))));
        assert!(!size.matches(Some(&json!("big"))));

        let cdn = FilterPredicate::new("enable_cdn", Operator::Eq, FilterValue::Bool(true));
        assert!(cdn.matches(Some(&json!(true))));
        assert!(cdn.matches(Some(&json!("TRUE"))));
        assert!(!cdn.matches(Some(&json!(false))));

        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let before = FilterPredicate::new("created", Operator::Lt, FilterValue::Timestamp(ts));
        assert!(before.matches(Some(&json!("2024-02-29T23:00:00.000-08:00"))));
        assert!(!before.matches(Some(&json!("2024-03-01T12:00:00Z"))));
        assert!(!before.matches(Some(&json!("yesterday"))));
    }
}
