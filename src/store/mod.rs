//! Metric store access.
//!
//! The store is an external collaborator: it hands back rows of one table,
//! optionally restricted to a set of hexagon ids. Two backends exist, a
//! PostgREST-style REST client and a local JSON directory.

pub mod file;
pub mod rest;

pub use file::FileStore;
pub use rest::RestStore;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::HexagonId;

/// Rows of one table plus the store's total count, when reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchResult {
    pub rows: Vec<Value>,
    /// Raw `Content-Range` style total (e.g. `0-9/123`).
    pub total_count: Option<String>,
}

/// `Content-Range` style value for `fetched` rows out of `total`.
pub fn content_range(fetched: usize, total: u64) -> String {
    if fetched == 0 {
        format!("*/{}", total)
    } else {
        format!("0-{}/{}", fetched - 1, total)
    }
}

impl FetchResult {
    /// Rows that are JSON objects; anything else is skipped.
    pub fn objects(self) -> impl Iterator<Item = Map<String, Value>> {
        self.rows.into_iter().filter_map(|row| match row {
            Value::Object(map) => Some(map),
            _ => None,
        })
    }
}

/// Failures of the metric store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("metric store is not configured: {0}")]
    Misconfigured(String),

    #[error("request for table {table} failed: {message}")]
    Transport { table: String, message: String },

    #[error("table {table} returned HTTP {status}: {body}")]
    Status {
        table: String,
        status: u16,
        body: String,
    },

    #[error("table {table} could not be decoded: {message}")]
    Decode { table: String, message: String },

    #[error("table {table} returned {fetched} of {total} rows")]
    Incomplete {
        table: String,
        fetched: usize,
        total: u64,
    },
}

/// Source of metric rows.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Fetch rows of `table`, restricted to `filter` ids when given.
    async fn fetch(
        &self,
        table: &str,
        filter: Option<&[HexagonId]>,
    ) -> Result<FetchResult, StoreError>;
}
