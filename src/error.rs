//! Request-boundary errors.
//!
//! Every failure that ends an evaluation is translated into one
//! [`SiteError`]. Degraded data and geocoding misses never get here.

use serde_json::{json, Value};
use thiserror::Error;

use crate::store::StoreError;
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum SiteError {
    /// The metric store could not deliver a table.
    #[error("upstream data failure: {0}")]
    Store(#[from] StoreError),

    /// The agent payload failed schema or invariant checks.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The research agent could not produce a payload.
    #[error("agent failure: {0:#}")]
    Agent(anyhow::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SiteError {
    /// HTTP-style status class of the failure.
    pub fn status_code(&self) -> u16 {
        match self {
            SiteError::Validation(_) => 400,
            SiteError::Store(_) | SiteError::Agent(_) | SiteError::Config(_) => 500,
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self.status_code() {
            400 => 2,
            _ => 1,
        }
    }

    /// Terminal error body, shaped like the success response.
    pub fn to_body(&self) -> Value {
        json!({ "error": self.to_string(), "status": self.status_code() })
    }
}
