//! Table store backed by the Supabase REST endpoint

use async_trait::async_trait;
use hogar_auth::Auth;
use hogar_postgrest::{FilterOperator, PostgrestClient, SortOrder};
use reqwest::Client;
use serde_json::Value;

use super::{Filter, Query, TableStore};
use crate::error::{from_postgrest, Result};

/// Talks to `{url}/rest/v1/{table}`.
///
/// Requests carry the anon key, plus the signed-in user's access token when
/// an auth client is attached so row-level security sees the user.
#[derive(Debug, Clone)]
pub struct PostgrestStore {
    url: String,
    key: String,
    http_client: Client,
    auth: Option<Auth>,
}

impl PostgrestStore {
    pub fn new(url: &str, key: &str, http_client: Client) -> Self {
        Self {
            url: url.to_string(),
            key: key.to_string(),
            http_client,
            auth: None,
        }
    }

    /// Forward the session token of `auth` on every request
    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    fn client(&self, operation: &'static str, table: &'static str) -> Result<PostgrestClient> {
        let client = PostgrestClient::new(&self.url, &self.key, table, self.http_client.clone());
        match self.auth.as_ref().and_then(Auth::access_token) {
            Some(token) => client
                .with_auth(&token)
                .map_err(from_postgrest(operation, table)),
            None => Ok(client),
        }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn apply_filters(mut client: PostgrestClient, filters: &[Filter]) -> PostgrestClient {
    for filter in filters {
        client = match filter {
            Filter::Eq(c, v) => client.filter(c, FilterOperator::Eq, &render(v)),
            Filter::Neq(c, v) => client.filter(c, FilterOperator::Neq, &render(v)),
            Filter::Gt(c, v) => client.filter(c, FilterOperator::Gt, &render(v)),
            Filter::Gte(c, v) => client.filter(c, FilterOperator::Gte, &render(v)),
            Filter::Lt(c, v) => client.filter(c, FilterOperator::Lt, &render(v)),
            Filter::Lte(c, v) => client.filter(c, FilterOperator::Lte, &render(v)),
            Filter::In(c, values) => {
                let values: Vec<String> = values.iter().map(render).collect();
                client.in_list(c, &values)
            }
            Filter::Prefix(c, prefix) => client.like(c, &format!("{}*", prefix)),
            Filter::IsNull(c) => client.is_null(c),
        };
    }
    client
}

// PostgREST answers a single-object insert with an array as well, but be
// lenient about the shape.
fn into_rows(value: Value) -> Vec<Value> {
    match value {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        row => vec![row],
    }
}

#[async_trait]
impl TableStore for PostgrestStore {
    async fn select(&self, table: &'static str, query: &Query) -> Result<Vec<Value>> {
        let mut client = apply_filters(self.client("select", table)?.select("*"), &query.filters);
        for order in &query.order {
            let direction = if order.ascending {
                SortOrder::Ascending
            } else {
                SortOrder::Descending
            };
            client = client.order(&order.column, direction);
        }
        if let Some(limit) = query.limit {
            client = client.limit(limit);
        }

        client
            .execute::<Value>()
            .await
            .map_err(from_postgrest("select", table))
    }

    async fn insert(&self, table: &'static str, rows: Vec<Value>) -> Result<Vec<Value>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let stored = self
            .client("insert", table)?
            .insert(Value::Array(rows))
            .await
            .map_err(from_postgrest("insert", table))?;
        Ok(into_rows(stored))
    }

    async fn update(&self, table: &'static str, filters: &[Filter], patch: Value) -> Result<()> {
        apply_filters(self.client("update", table)?, filters)
            .update(patch)
            .await
            .map_err(from_postgrest("update", table))?;
        Ok(())
    }

    async fn delete(&self, table: &'static str, filters: &[Filter]) -> Result<()> {
        apply_filters(self.client("delete", table)?, filters)
            .delete()
            .await
            .map_err(from_postgrest("delete", table))?;
        Ok(())
    }

    async fn count(&self, table: &'static str, filters: &[Filter]) -> Result<usize> {
        apply_filters(self.client("count", table)?.select("id"), filters)
            .count_exact()
            .await
            .map_err(from_postgrest("count", table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_select_translates_query() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/grocery_items"))
            .and(query_param("status", "in.(needed,in_cart)"))
            .and(query_param("order", "category.asc,name.asc"))
            .and(header("apikey", "test_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "g1", "name": "Pan", "category": "despensa", "status": "needed"}
            ])))
            .mount(&mock_server)
            .await;

        let store = PostgrestStore::new(&mock_server.uri(), "test_key", Client::new());
        let query = Query::new()
            .in_list("status", ["needed", "in_cart"])
            .order_by("category", true)
            .order_by("name", true);
        let rows = store.select("grocery_items", &query).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Pan");
    }

    #[tokio::test]
    async fn test_prefix_and_numbers() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/tasks"))
            .and(query_param("title", "like.🛒 Ir al supermercado*"))
            .and(query_param("month", "eq.3"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let store = PostgrestStore::new(&mock_server.uri(), "test_key", Client::new());
        let query = Query::new()
            .prefix("title", "🛒 Ir al supermercado")
            .eq("month", 3)
            .limit(1);
        assert!(store.select("tasks", &query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_count_reads_content_range() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/rest/v1/tasks"))
            .and(query_param("status", "eq.completed"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-range", "0-4/5"))
            .mount(&mock_server)
            .await;

        let store = PostgrestStore::new(&mock_server.uri(), "test_key", Client::new());
        let count = store
            .count("tasks", &[Filter::Eq("status".into(), json!("completed"))])
            .await
            .unwrap();
        assert_eq!(count, 5);
    }

    #[tokio::test]
    async fn test_errors_map_to_store_errors() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/tasks"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "23514",
                "message": "new row violates check constraint"
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/rest/v1/tasks"))
            .respond_with(ResponseTemplate::new(401).set_body_string("JWT expired"))
            .mount(&mock_server)
            .await;

        let store = PostgrestStore::new(&mock_server.uri(), "test_key", Client::new());
        let filters = [Filter::Eq("id".into(), json!("t1"))];

        let update = store
            .update("tasks", &filters, json!({"status": "completed"}))
            .await;
        assert!(matches!(
            update,
            Err(Error::Store { operation: "update", entity: "tasks", .. })
        ));

        let delete = store.delete("tasks", &filters).await;
        assert!(matches!(delete, Err(Error::NotAuthenticated)));
    }
}
