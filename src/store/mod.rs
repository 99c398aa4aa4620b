//! Table store abstraction
//!
//! The engine talks to its backend through [`TableStore`], a row-oriented
//! interface shaped after PostgREST: per-table select with filters and
//! ordering, insert returning the stored rows, filtered update and delete,
//! and exact counts. Rows travel as JSON objects; typed access lives in
//! [`crate::repository`].

mod memory;
mod postgrest;

pub use self::memory::MemoryStore;
pub use self::postgrest::PostgrestStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Row filter
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
    /// Text column starting with the given prefix
    Prefix(String, String),
    IsNull(String),
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _)
            | Filter::Neq(c, _)
            | Filter::Gt(c, _)
            | Filter::Gte(c, _)
            | Filter::Lt(c, _)
            | Filter::Lte(c, _)
            | Filter::In(c, _)
            | Filter::Prefix(c, _)
            | Filter::IsNull(c) => c,
        }
    }
}

/// Sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A select: filters, sort keys and an optional row limit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(column.to_string(), value.into()))
    }

    pub fn neq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Neq(column.to_string(), value.into()))
    }

    pub fn gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Gt(column.to_string(), value.into()))
    }

    pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Gte(column.to_string(), value.into()))
    }

    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Lt(column.to_string(), value.into()))
    }

    pub fn lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Lte(column.to_string(), value.into()))
    }

    pub fn in_list<V: Into<Value>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.filter(Filter::In(column.to_string(), values))
    }

    pub fn prefix(self, column: &str, prefix: &str) -> Self {
        self.filter(Filter::Prefix(column.to_string(), prefix.to_string()))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(Filter::IsNull(column.to_string()))
    }

    /// Add a sort key; earlier keys take precedence
    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, count: usize) -> Self {
        self.limit = Some(count);
        self
    }
}

/// Row-oriented persistence backend
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Rows of `table` matching the query
    async fn select(&self, table: &'static str, query: &Query) -> Result<Vec<Value>>;

    /// Insert rows, returning them as stored (ids and defaults filled in)
    async fn insert(&self, table: &'static str, rows: Vec<Value>) -> Result<Vec<Value>>;

    /// Apply `patch` to every row matching `filters`
    async fn update(&self, table: &'static str, filters: &[Filter], patch: Value) -> Result<()>;

    /// Remove every row matching `filters`
    async fn delete(&self, table: &'static str, filters: &[Filter]) -> Result<()>;

    /// Number of rows matching `filters`
    async fn count(&self, table: &'static str, filters: &[Filter]) -> Result<usize>;
}
