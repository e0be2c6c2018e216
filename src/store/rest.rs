//! PostgREST / Supabase REST client.
//!
//! `GET {url}/rest/v1/{table}` with `select=*`, an optional `in.(...)`
//! filter on the id column, and `Prefer: count=exact` so the total row
//! count comes back in `Content-Range`. The server caps each response, so
//! tables are read page by page with `Range` until the total is reached.

use async_trait::async_trait;
use reqwest::header::CONTENT_RANGE;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::{content_range, FetchResult, MetricStore, StoreError};
use crate::config::StoreConfig;
use crate::models::HexagonId;

/// REST-backed metric store.
pub struct RestStore {
    base_url: String,
    api_key: String,
    id_field: String,
    page_size: usize,
    http_client: reqwest::Client,
}

impl RestStore {
    /// Build a client from configuration. Fails when the URL or key is missing.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let base_url = config
            .url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                StoreError::Misconfigured("no store URL (set SUPABASE_URL or store.url)".to_string())
            })?;

        let api_key = config.api_key.clone().filter(|k| !k.is_empty()).ok_or_else(|| {
            StoreError::Misconfigured(
                "no store API key (set SUPABASE_ANON_KEY or store.api_key)".to_string(),
            )
        })?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| StoreError::Misconfigured(format!("failed to build HTTP client: {}", e)))?;

        info!("Metric store at {}", base_url);

        Ok(Self {
            base_url,
            api_key,
            id_field: config.id_field.clone(),
            page_size: config.page_size.max(1),
            http_client,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }
}

/// Query parameters for one fetch.
fn query_params(id_field: &str, filter: Option<&[HexagonId]>) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];

    if let Some(ids) = filter {
        let quoted: Vec<String> = ids
            .iter()
            .map(|id| format!("\"{}\"", id.replace('"', "")))
            .collect();
        params.push((id_field.to_string(), format!("in.({})", quoted.join(","))));
    }

    params
}

/// Total row count from a `Content-Range` value like `0-9/123` or `*/0`.
pub fn total_from_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/').and_then(|(_, total)| total.trim().parse().ok())
}

/// `Range` header value for the page starting at `offset`.
fn page_range(offset: usize, page_size: usize) -> String {
    format!("{}-{}", offset, offset + page_size - 1)
}

impl RestStore {
    /// One page of `table`: its rows and the total reported by the server.
    async fn fetch_page(
        &self,
        table: &str,
        params: &[(String, String)],
        offset: usize,
    ) -> Result<(Vec<Value>, Option<u64>), StoreError> {
        let response = self
            .http_client
            .get(self.table_url(table))
            .query(params)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .header("Prefer", "count=exact")
            .header("Range-Unit", "items")
            .header("Range", page_range(offset, self.page_size))
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_timeout() {
                    "request timed out".to_string()
                } else if e.is_connect() {
                    format!("cannot connect to {}", self.base_url)
                } else {
                    e.to_string()
                };
                StoreError::Transport {
                    table: table.to_string(),
                    message,
                }
            })?;

        let status = response.status();

        // Asking past the end of a table that shrank between pages.
        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok((Vec::new(), None));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                table: table.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(total_from_content_range);

        let body: Value = response.json().await.map_err(|e| StoreError::Decode {
            table: table.to_string(),
            message: e.to_string(),
        })?;

        match body {
            Value::Array(rows) => Ok((rows, total)),
            other => Err(StoreError::Decode {
                table: table.to_string(),
                message: format!("expected a JSON array, got {}", kind_of(&other)),
            }),
        }
    }
}

#[async_trait]
impl MetricStore for RestStore {
    async fn fetch(
        &self,
        table: &str,
        filter: Option<&[HexagonId]>,
    ) -> Result<FetchResult, StoreError> {
        if filter.is_some_and(|ids| ids.is_empty()) {
            return Ok(FetchResult::default());
        }

        debug!(
            "Fetching {} (filter: {:?})",
            self.table_url(table),
            filter.map(|f| f.len())
        );

        let params = query_params(&self.id_field, filter);
        let mut rows: Vec<Value> = Vec::new();
        let mut total: Option<u64> = None;

        loop {
            let (page, page_total) = self.fetch_page(table, &params, rows.len()).await?;
            let page_len = page.len();
            rows.extend(page);
            total = page_total.or(total);

            let complete = total.is_some_and(|t| rows.len() as u64 >= t);
            if page_len == 0 || complete || (total.is_none() && page_len < self.page_size) {
                break;
            }
            debug!("{}: {} rows so far ({:?} total)", table, rows.len(), total);
        }

        if let Some(total) = total {
            if (rows.len() as u64) < total {
                return Err(StoreError::Incomplete {
                    table: table.to_string(),
                    fetched: rows.len(),
                    total,
                });
            }
        }

        debug!("{}: {} rows ({:?} total)", table, rows.len(), total);

        let total_count = Some(content_range(
            rows.len(),
            total.unwrap_or(rows.len() as u64),
        ));
        Ok(FetchResult { rows, total_count })
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
