//! In-process table store

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{Filter, Order, Query, TableStore};
use crate::error::{Error, Result};

#[derive(Debug)]
struct FailureRule {
    operation: &'static str,
    table: &'static str,
    /// `None` fails until cleared
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, Vec<Map<String, Value>>>,
    failures: Vec<FailureRule>,
    last_created_at: Option<DateTime<Utc>>,
}

/// Table store kept in memory.
///
/// Fills `id` (a v4 uuid) and `created_at` on insert the way the database
/// defaults do, and can be told to fail chosen operations.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `operation` (`"select"`, `"insert"`, `"update"`,
    /// `"delete"`, `"count"`) on `table`
    pub fn fail_next(&self, operation: &'static str, table: &'static str) {
        self.lock().failures.push(FailureRule {
            operation,
            table,
            remaining: Some(1),
        });
    }

    /// Fail every `operation` on `table` until [`MemoryStore::clear_failures`]
    pub fn fail_always(&self, operation: &'static str, table: &'static str) {
        self.lock().failures.push(FailureRule {
            operation,
            table,
            remaining: None,
        });
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Snapshot of every row in `table`, in insertion order
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.lock()
            .tables
            .get(table)
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Inner {
    fn check_failure(&mut self, operation: &'static str, table: &'static str) -> Result<()> {
        let position = self
            .failures
            .iter()
            .position(|rule| rule.operation == operation && rule.table == table);
        let Some(position) = position else {
            return Ok(());
        };

        let exhausted = match self.failures[position].remaining.as_mut() {
            Some(remaining) => {
                *remaining -= 1;
                *remaining == 0
            }
            None => false,
        };
        if exhausted {
            self.failures.remove(position);
        }
        Err(Error::store(operation, table, "injected failure"))
    }

    // Strictly increasing so rows inserted back to back still sort by age.
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let mut stamp = Utc::now();
        if let Some(last) = self.last_created_at {
            if stamp <= last {
                stamp = last + Duration::microseconds(1);
            }
        }
        self.last_created_at = Some(stamp);
        stamp
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn select(&self, table: &'static str, query: &Query) -> Result<Vec<Value>> {
        let mut inner = self.lock();
        inner.check_failure("select", table)?;

        let mut rows: Vec<Map<String, Value>> = inner
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(row, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if !query.order.is_empty() {
            rows.sort_by(|a, b| compare_rows(a, b, &query.order));
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        debug!("select {} -> {} rows", table, rows.len());
        Ok(rows.into_iter().map(Value::Object).collect())
    }

    async fn insert(&self, table: &'static str, rows: Vec<Value>) -> Result<Vec<Value>> {
        let mut inner = self.lock();
        inner.check_failure("insert", table)?;

        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            let Value::Object(mut row) = row else {
                return Err(Error::store("insert", table, "row is not a JSON object"));
            };
            if !matches!(row.get("id"), Some(Value::String(_))) {
                row.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
            }
            if row.get("created_at").map_or(true, Value::is_null) {
                let stamp = inner.next_created_at();
                row.insert("created_at".to_string(), Value::String(stamp.to_rfc3339()));
            }
            stored.push(row);
        }

        inner
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(stored.iter().cloned());

        debug!("insert {} <- {} rows", table, stored.len());
        Ok(stored.into_iter().map(Value::Object).collect())
    }

    async fn update(&self, table: &'static str, filters: &[Filter], patch: Value) -> Result<()> {
        let mut inner = self.lock();
        inner.check_failure("update", table)?;

        let Value::Object(patch) = patch else {
            return Err(Error::store("update", table, "patch is not a JSON object"));
        };
        if let Some(rows) = inner.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| matches_all(row, filters)) {
                for (key, value) in &patch {
                    row.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, table: &'static str, filters: &[Filter]) -> Result<()> {
        let mut inner = self.lock();
        inner.check_failure("delete", table)?;

        if let Some(rows) = inner.tables.get_mut(table) {
            rows.retain(|row| !matches_all(row, filters));
        }
        Ok(())
    }

    async fn count(&self, table: &'static str, filters: &[Filter]) -> Result<usize> {
        let mut inner = self.lock();
        inner.check_failure("count", table)?;

        Ok(inner
            .tables
            .get(table)
            .map(|rows| rows.iter().filter(|row| matches_all(row, filters)).count())
            .unwrap_or(0))
    }
}

fn matches_all(row: &Map<String, Value>, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| matches(row, filter))
}

fn matches(row: &Map<String, Value>, filter: &Filter) -> bool {
    let cell = row.get(filter.column()).unwrap_or(&Value::Null);
    match filter {
        Filter::Eq(_, value) => values_equal(cell, value),
        // SQL semantics: NULL <> x is not true
        Filter::Neq(_, value) => !cell.is_null() && !values_equal(cell, value),
        Filter::Gt(_, value) => compare_values(cell, value) == Some(Ordering::Greater),
        Filter::Gte(_, value) => matches!(
            compare_values(cell, value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Filter::Lt(_, value) => compare_values(cell, value) == Some(Ordering::Less),
        Filter::Lte(_, value) => matches!(
            compare_values(cell, value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Filter::In(_, values) => values.iter().any(|value| values_equal(cell, value)),
        Filter::Prefix(_, prefix) => cell
            .as_str()
            .map_or(false, |s| s.starts_with(prefix.as_str())),
        Filter::IsNull(_) => cell.is_null(),
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    compare_values(a, b) == Some(Ordering::Equal)
}

// Timestamps compare as instants, not as text, so "…Z" and "…+00:00" agree.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (parse_timestamp(x), parse_timestamp(y)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

// Nulls last when ascending, first when descending (the PostgreSQL default).
fn compare_rows(a: &Map<String, Value>, b: &Map<String, Value>, order: &[Order]) -> Ordering {
    for key in order {
        let x = a.get(&key.column).unwrap_or(&Value::Null);
        let y = b.get(&key.column).unwrap_or(&Value::Null);
        let ordering = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => compare_values(x, y).unwrap_or(Ordering::Equal),
        };
        let ordering = if key.ascending {
            ordering
        } else {
            ordering.reverse()
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_fills_id_and_created_at() {
        let store = MemoryStore::new();
        let rows = store
            .insert("tasks", vec![json!({"title": "a"}), json!({"title": "b"})])
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows[0]["id"].is_string());
        assert_ne!(rows[0]["id"], rows[1]["id"]);
        let first = parse_timestamp(rows[0]["created_at"].as_str().unwrap()).unwrap();
        let second = parse_timestamp(rows[1]["created_at"].as_str().unwrap()).unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn test_filters_and_order() {
        let store = MemoryStore::new();
        store
            .insert(
                "grocery_items",
                vec![
                    json!({"name": "Pan", "category": "despensa", "status": "needed"}),
                    json!({"name": "Arroz", "category": "despensa", "status": "in_cart"}),
                    json!({"name": "Leche", "category": "lacteos", "status": "stocked"}),
                ],
            )
            .await
            .unwrap();

        let query = Query::new()
            .in_list("status", ["needed", "in_cart"])
            .order_by("category", true)
            .order_by("name", true);
        let rows = store.select("grocery_items", &query).await.unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Arroz", "Pan"]);

        let count = store
            .count("grocery_items", &[Filter::Neq("status".into(), json!("stocked"))])
            .await
            .unwrap();
        assert_eq!(count, 2);

        let prefixed = store
            .select("grocery_items", &Query::new().prefix("name", "Pa"))
            .await
            .unwrap();
        assert_eq!(prefixed.len(), 1);
    }

    #[tokio::test]
    async fn test_timestamps_compare_as_instants() {
        let store = MemoryStore::new();
        store
            .insert(
                "tasks",
                vec![
                    json!({"status": "completed", "completed_at": "2024-03-10T03:00:00+00:00"}),
                    json!({"status": "completed", "completed_at": "2024-03-09T23:00:00-05:00"}),
                    json!({"status": "completed", "completed_at": null}),
                ],
            )
            .await
            .unwrap();

        let count = store
            .count(
                "tasks",
                &[Filter::Gte("completed_at".into(), json!("2024-03-10T03:00:00Z"))],
            )
            .await
            .unwrap();
        // 23:00 at -05:00 is 04:00 UTC
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = MemoryStore::new();
        let rows = store
            .insert("routines", vec![json!({"name": "Sacar basura"})])
            .await
            .unwrap();
        let id = rows[0]["id"].clone();

        store
            .update(
                "routines",
                &[Filter::Eq("id".into(), id.clone())],
                json!({"last_done_by": "u1"}),
            )
            .await
            .unwrap();
        assert_eq!(store.rows("routines")[0]["last_done_by"], json!("u1"));

        store
            .delete("routines", &[Filter::Eq("id".into(), id)])
            .await
            .unwrap();
        assert!(store.rows("routines").is_empty());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryStore::new();
        store.fail_next("insert", "bills");

        let result = store.insert("bills", vec![json!({"name": "Internet"})]).await;
        assert!(matches!(result, Err(Error::Store { operation: "insert", .. })));

        // one-shot
        assert!(store.insert("bills", vec![json!({"name": "Internet"})]).await.is_ok());

        store.fail_always("select", "bills");
        assert!(store.select("bills", &Query::new()).await.is_err());
        assert!(store.select("bills", &Query::new()).await.is_err());
        store.clear_failures();
        assert_eq!(store.select("bills", &Query::new()).await.unwrap().len(), 1);
    }
}
