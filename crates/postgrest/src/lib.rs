//! PostgREST table client
//!
//! A small client for the table endpoints of a PostgREST server (as exposed
//! by Supabase under `/rest/v1`). It covers what a row-oriented table store
//! needs:
//!
//! - `select` with column lists, filters, ordering and limits
//! - exact row counts
//! - `insert`, `update` and `delete` with filters

use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Details of an error reported by the PostgREST API
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostgrestApiErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for PostgrestApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("Code: {}", code));
        }
        if let Some(message) = &self.message {
            parts.push(format!("Message: {}", message));
        }
        if let Some(details) = &self.details {
            parts.push(format!("Details: {}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("Hint: {}", hint));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// Error type
#[derive(Error, Debug)]
pub enum PostgrestError {
    #[error("API error: {details} (Status: {status})")]
    ApiError {
        details: PostgrestApiErrorDetails,
        status: StatusCode,
    },

    #[error("API error (unparsed): {message} (Status: {status})")]
    UnparsedApiError { message: String, status: StatusCode },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// Operator for filter expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Pattern match, `*` is the wildcard
    Like,
    /// `is.null`, `is.true`, ...
    Is,
    /// Membership in a parenthesised list
    In,
}

impl FilterOperator {
    /// Convert the operator to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Like => "like",
            FilterOperator::Is => "is",
            FilterOperator::In => "in",
        }
    }
}

/// Client for a single PostgREST table
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    base_url: String,
    table: String,
    http_client: Client,
    headers: HeaderMap,
    // A Vec rather than a map: PostgREST accepts the same column several
    // times (`completed_at=gte.x&completed_at=lt.y`).
    query_params: Vec<(String, String)>,
}

impl PostgrestClient {
    /// Create a client for `table` under `{base_url}/rest/v1`
    pub fn new(base_url: &str, api_key: &str, table: &str, http_client: Client) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(api_key) {
            headers.insert("apikey", value);
        }
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            http_client,
            headers,
            query_params: Vec::new(),
        }
    }

    /// Add a header
    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self, PostgrestError> {
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header value: {}", value))
        })?;
        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header name: {}", key))
        })?;

        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Set the bearer token used for row-level security
    pub fn with_auth(self, token: &str) -> Result<Self, PostgrestError> {
        self.with_header("Authorization", &format!("Bearer {}", token))
    }

    /// Columns to return
    pub fn select(mut self, columns: &str) -> Self {
        self.set_param("select", columns.to_string());
        self
    }

    /// Generic filter: `column=operator.value`
    pub fn filter(mut self, column: &str, operator: FilterOperator, value: &str) -> Self {
        self.query_params
            .push((column.to_string(), format!("{}.{}", operator.as_str(), value)));
        self
    }

    pub fn eq(self, column: &str, value: &str) -> Self {
        self.filter(column, FilterOperator::Eq, value)
    }

    pub fn neq(self, column: &str, value: &str) -> Self {
        self.filter(column, FilterOperator::Neq, value)
    }

    pub fn gt(self, column: &str, value: &str) -> Self {
        self.filter(column, FilterOperator::Gt, value)
    }

    pub fn gte(self, column: &str, value: &str) -> Self {
        self.filter(column, FilterOperator::Gte, value)
    }

    pub fn lt(self, column: &str, value: &str) -> Self {
        self.filter(column, FilterOperator::Lt, value)
    }

    pub fn lte(self, column: &str, value: &str) -> Self {
        self.filter(column, FilterOperator::Lte, value)
    }

    /// LIKE filter; use `*` as the wildcard
    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.filter(column, FilterOperator::Like, pattern)
    }

    /// `column IS NULL`
    pub fn is_null(self, column: &str) -> Self {
        self.filter(column, FilterOperator::Is, "null")
    }

    /// IN filter
    pub fn in_list<S: AsRef<str>>(self, column: &str, values: &[S]) -> Self {
        let list: Vec<String> = values.iter().map(|v| quote_list_value(v.as_ref())).collect();
        let value = format!("({})", list.join(","));
        self.filter(column, FilterOperator::In, &value)
    }

    /// Order by a column. Repeated calls add secondary sort keys.
    pub fn order(mut self, column: &str, order: SortOrder) -> Self {
        let term = format!("{}.{}", column, order.as_str());
        match self.query_params.iter_mut().find(|(key, _)| key == "order") {
            Some((_, existing)) => {
                existing.push(',');
                existing.push_str(&term);
            }
            None => self.query_params.push(("order".to_string(), term)),
        }
        self
    }

    /// Limit the number of rows returned
    pub fn limit(mut self, count: usize) -> Self {
        self.set_param("limit", count.to_string());
        self
    }

    /// Fetch rows
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<Vec<T>, PostgrestError> {
        let response = self.send(Method::GET, None, None).await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }

    /// Count matching rows without transferring them
    pub async fn count_exact(&self) -> Result<usize, PostgrestError> {
        let response = self.send(Method::HEAD, Some("count=exact"), None).await?;
        let range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                PostgrestError::DeserializationError("Missing Content-Range header".to_string())
            })?;
        parse_content_range_total(range)
    }

    /// Insert one row or an array of rows, returning the stored representation
    pub async fn insert<T: Serialize>(&self, values: T) -> Result<Value, PostgrestError> {
        let body = serde_json::to_value(values)?;
        let response = self
            .send(Method::POST, Some("return=representation"), Some(&body))
            .await?;
        read_json_body(response).await
    }

    /// Update the rows selected by the current filters
    pub async fn update<T: Serialize>(&self, values: T) -> Result<Value, PostgrestError> {
        self.require_filters("update")?;
        let body = serde_json::to_value(values)?;
        let response = self
            .send(Method::PATCH, Some("return=representation"), Some(&body))
            .await?;
        read_json_body(response).await
    }

    /// Delete the rows selected by the current filters
    pub async fn delete(&self) -> Result<Value, PostgrestError> {
        self.require_filters("delete")?;
        let response = self
            .send(Method::DELETE, Some("return=representation"), None)
            .await?;
        read_json_body(response).await
    }

    fn set_param(&mut self, key: &str, value: String) {
        self.query_params.retain(|(k, _)| k != key);
        self.query_params.push((key.to_string(), value));
    }

    // An unfiltered PATCH/DELETE would touch every row of the table.
    fn require_filters(&self, operation: &str) -> Result<(), PostgrestError> {
        let filtered = self
            .query_params
            .iter()
            .any(|(k, _)| !matches!(k.as_str(), "select" | "order" | "limit"));
        if filtered {
            Ok(())
        } else {
            Err(PostgrestError::InvalidParameters(format!(
                "Refusing to {} {} without a filter",
                operation, self.table
            )))
        }
    }

    fn build_url(&self) -> Result<Url, PostgrestError> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, self.table))?;
        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        prefer: Option<&'static str>,
        body: Option<&Value>,
    ) -> Result<Response, PostgrestError> {
        let url = self.build_url()?;
        debug!("{} {}", method, url);

        let mut headers = self.headers.clone();
        if let Some(prefer) = prefer {
            headers.insert(
                HeaderName::from_static("prefer"),
                HeaderValue::from_static(prefer),
            );
        }

        let mut request = self.http_client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(PostgrestError::NetworkError)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());
        match serde_json::from_str::<PostgrestApiErrorDetails>(&error_text) {
            Ok(details) => Err(PostgrestError::ApiError { details, status }),
            Err(_) => Err(PostgrestError::UnparsedApiError {
                message: error_text,
                status,
            }),
        }
    }
}

// Values containing list separators must be double-quoted inside `in.(...)`.
fn quote_list_value(value: &str) -> String {
    if value.contains([',', '(', ')', '"']) {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// Parse the total out of a `Content-Range` header (`0-24/25`, `*/0`)
fn parse_content_range_total(range: &str) -> Result<usize, PostgrestError> {
    range
        .rsplit_once('/')
        .and_then(|(_, total)| total.trim().parse::<usize>().ok())
        .ok_or_else(|| {
            PostgrestError::DeserializationError(format!("Unexpected Content-Range: {}", range))
        })
}

async fn read_json_body(response: Response) -> Result<Value, PostgrestError> {
    let body_text = response.text().await.map_err(|e| {
        PostgrestError::DeserializationError(format!("Failed to read response body: {}", e))
    })?;

    // 204 No Content and `return=minimal` both produce an empty body.
    if body_text.trim().is_empty() {
        Ok(Value::Array(Vec::new()))
    } else {
        serde_json::from_str::<Value>(&body_text)
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, table: &str) -> PostgrestClient {
        PostgrestClient::new(&server.uri(), "fake-key", table, reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_select_with_filters_and_order() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/tasks"))
            .and(query_param("select", "*"))
            .and(query_param("status", "eq.pending"))
            .and(query_param("order", "created_at.desc"))
            .and(header("apikey", "fake-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "t1", "title": "Lavar loza" },
                { "id": "t2", "title": "Regar plantas" }
            ])))
            .mount(&mock_server)
            .await;

        let rows = client(&mock_server, "tasks")
            .select("*")
            .eq("status", "pending")
            .order("created_at", SortOrder::Descending)
            .execute::<Value>()
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["title"], "Lavar loza");
    }

    #[test]
    fn test_order_accumulates_sort_keys() {
        let client = PostgrestClient::new(
            "http://localhost:54321",
            "fake-key",
            "grocery_items",
            reqwest::Client::new(),
        )
        .order("category", SortOrder::Ascending)
        .order("name", SortOrder::Ascending);

        let url = client.build_url().unwrap();
        let order: Vec<String> = url
            .query_pairs()
            .filter(|(k, _)| k == "order")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(order, vec!["category.asc,name.asc".to_string()]);
    }

    #[test]
    fn test_repeated_column_filters_are_kept() {
        let client = PostgrestClient::new(
            "http://localhost:54321/",
            "fake-key",
            "tasks",
            reqwest::Client::new(),
        )
        .gte("completed_at", "2026-10-11T00:00:00Z")
        .lt("completed_at", "2026-10-18T00:00:00Z")
        .in_list("status", &["needed", "in_cart"]);

        let url = client.build_url().unwrap();
        assert!(url.as_str().starts_with("http://localhost:54321/rest/v1/tasks?"));
        let completed: Vec<String> = url
            .query_pairs()
            .filter(|(k, _)| k == "completed_at")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(completed.len(), 2);
        let status = url
            .query_pairs()
            .find(|(k, _)| k == "status")
            .map(|(_, v)| v.into_owned());
        assert_eq!(status.as_deref(), Some("in.(needed,in_cart)"));
    }

    #[test]
    fn test_in_list_quotes_values_with_separators() {
        assert_eq!(quote_list_value("Verduras/Frutas"), "Verduras/Frutas");
        assert_eq!(quote_list_value("a,b"), "\"a,b\"");
    }

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("0-24/25").unwrap(), 25);
        assert_eq!(parse_content_range_total("*/0").unwrap(), 0);
        assert!(parse_content_range_total("0-24/*").is_err());
    }

    #[tokio::test]
    async fn test_count_exact() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/rest/v1/bills"))
            .and(header("prefer", "count=exact"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Range", "0-1/2"))
            .mount(&mock_server)
            .await;

        let count = client(&mock_server, "bills")
            .select("id")
            .count_exact()
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_insert() {
        let mock_server = MockServer::start().await;
        let new_row = json!({ "name": "Internet", "due_day": 15 });

        Mock::given(method("POST"))
            .and(path("/rest/v1/bills"))
            .and(header("prefer", "return=representation"))
            .and(body_json(&new_row))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([
                { "id": "b1", "name": "Internet", "due_day": 15 }
            ])))
            .mount(&mock_server)
            .await;

        let inserted = client(&mock_server, "bills").insert(&new_row).await.unwrap();
        assert_eq!(inserted[0]["id"], "b1");
    }

    #[tokio::test]
    async fn test_update_with_empty_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/tasks"))
            .and(query_param("id", "eq.t1"))
            .and(body_json(json!({ "title": "Nuevo" })))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let result = client(&mock_server, "tasks")
            .eq("id", "t1")
            .update(json!({ "title": "Nuevo" }))
            .await
            .unwrap();
        assert_eq!(result, Value::Array(Vec::new()));
    }

    #[tokio::test]
    async fn test_unfiltered_delete_is_rejected() {
        let mock_server = MockServer::start().await;

        let result = client(&mock_server, "tasks").delete().await;
        assert!(matches!(result, Err(PostgrestError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn test_delete() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/rest/v1/routines"))
            .and(query_param("id", "eq.r1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "r1" }])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let deleted = client(&mock_server, "routines")
            .eq("id", "r1")
            .delete()
            .await
            .unwrap();
        assert_eq!(deleted[0]["id"], "r1");
    }

    #[tokio::test]
    async fn test_error_handling() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/categories"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": "42501",
                "message": "permission denied for table categories",
                "details": null,
                "hint": null
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/bills"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server, "categories")
            .select("*")
            .execute::<Value>()
            .await
            .unwrap_err();
        match err {
            PostgrestError::ApiError { details, status } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(details.code.as_deref(), Some("42501"));
            }
            other => panic!("Expected ApiError, got {:?}", other),
        }

        let err = client(&mock_server, "bills")
            .select("*")
            .execute::<Value>()
            .await
            .unwrap_err();
        match err {
            PostgrestError::UnparsedApiError { message, status } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("Expected UnparsedApiError, got {:?}", other),
        }
    }
}
