//! Backing-store contract
//!
//! Traits the connection manager and entity stores talk to, plus the query
//! types they pass across that boundary.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A stored document: field name to JSON value.
pub type Record = serde_json::Map<String, Value>;

/// Field holding the store-generated identifier.
pub const ID_FIELD: &str = "_id";

// == Filter ==
/// Equality filter: a record matches when every listed field is equal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    fields: Record,
}

impl Filter {
    /// Matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches records whose `field` equals `value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(field, value)
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Field/value pairs that must all be equal.
    pub fn fields(&self) -> &Record {
        &self.fields
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.fields
            .iter()
            .all(|(field, expected)| record.get(field) == Some(expected))
    }
}

// == Sorting ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    /// Parses `asc`/`desc` (case-insensitive); anything else is ascending.
    pub fn parse(order: &str) -> Self {
        if order.eq_ignore_ascii_case("desc") {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        }
    }
}

/// Orders two JSON values: missing < null < bool < number < string, then by value.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(Value::Array(_)) => 5,
            Some(Value::Object(_)) => 6,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

// == Find Query ==
/// Parameters of a `find` call.
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    pub filter: Filter,
    /// Fields to keep; `None` keeps everything
    pub projection: Option<Vec<String>>,
    pub sort: Vec<(String, SortOrder)>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl FindQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((field.into(), order));
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn project(mut self, fields: &[&str]) -> Self {
        self.projection = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }
}

// == Backend ==
/// One live session against the document store.
///
/// Records returned by `find` never carry [`ID_FIELD`].
#[async_trait]
pub trait Backend: Send + Sync {
    /// Inserts `record` and returns the generated id.
    async fn insert_one(&self, collection: &str, record: Record) -> Result<String>;

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Record>>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Merges `patch` into the first matching record; returns the matched count.
    async fn update_one(&self, collection: &str, filter: &Filter, patch: Record) -> Result<u64>;

    /// Removes the first matching record; returns the deleted count.
    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Lightweight liveness check.
    async fn ping(&self) -> Result<()>;
}

/// Shared handle to a backend session.
pub type Handle = Arc<dyn Backend>;

// == Connector ==
/// Opens backend sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a session; `uri` of `None` means the local default.
    async fn connect(&self, uri: Option<&str>) -> Result<Handle>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_filter_matches_all_fields() {
        let rec = record(json!({"name": "Lima", "code": "LI"}));
        assert!(Filter::all().matches(&rec));
        assert!(Filter::eq("name", "Lima").matches(&rec));
        assert!(!Filter::eq("name", "Lima").and("code", "XX").matches(&rec));
        assert!(!Filter::eq("missing", "x").matches(&rec));
    }

    #[test]
    fn test_compare_values_orders_by_type_then_value() {
        let a = json!("Austin");
        let b = json!("Boston");
        let n = json!(5);
        assert_eq!(compare_values(Some(&a), Some(&b)), Ordering::Less);
        assert_eq!(compare_values(Some(&n), Some(&a)), Ordering::Less);
        assert_eq!(compare_values(None, Some(&n)), Ordering::Less);
        assert_eq!(
            compare_values(Some(&json!(10)), Some(&json!(2.5))),
            Ordering::Greater
        );
    }

    #[test]
    fn test_sort_order_parse() {
        assert_eq!(SortOrder::parse("DESC"), SortOrder::Descending);
        assert_eq!(SortOrder::parse("asc"), SortOrder::Ascending);
        assert_eq!(SortOrder::parse("sideways"), SortOrder::Ascending);
    }
}
