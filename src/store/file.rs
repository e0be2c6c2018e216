//! Local JSON metric store.
//!
//! Reads `<dir>/<table>.json`, a JSON array of row objects, for offline
//! evaluations and tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

use super::{content_range, FetchResult, MetricStore, StoreError};
use crate::models::HexagonId;

/// Directory-backed metric store.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    id_field: String,
}

impl FileStore {
    pub fn new(root: PathBuf, id_field: impl Into<String>) -> Self {
        Self {
            root,
            id_field: id_field.into(),
        }
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.root.join(format!("{}.json", table))
    }
}

#[async_trait]
impl MetricStore for FileStore {
    async fn fetch(
        &self,
        table: &str,
        filter: Option<&[HexagonId]>,
    ) -> Result<FetchResult, StoreError> {
        let path = self.table_path(table);
        debug!("Reading table {} from {}", table, path.display());

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| StoreError::Transport {
                table: table.to_string(),
                message: format!("cannot read {}: {}", path.display(), e),
            })?;

        let rows = match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(rows)) => rows,
            Ok(_) => {
                return Err(StoreError::Decode {
                    table: table.to_string(),
                    message: format!("{} is not a JSON array", path.display()),
                })
            }
            Err(e) => {
                return Err(StoreError::Decode {
                    table: table.to_string(),
                    message: e.to_string(),
                })
            }
        };

        let rows: Vec<Value> = match filter {
            Some(ids) => {
                let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
                rows.into_iter()
                    .filter(|row| {
                        row.get(&self.id_field)
                            .and_then(Value::as_str)
                            .is_some_and(|id| wanted.contains(id))
                    })
                    .collect()
            }
            None => rows,
        };

        let total_count = content_range(rows.len(), rows.len() as u64);

        Ok(FetchResult {
            rows,
            total_count: Some(total_count),
        })
    }
}
