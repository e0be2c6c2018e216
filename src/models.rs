//! Data models for the site evaluator.
//!
//! This module contains the core data structures shared by the
//! aggregation pipeline, the research agent, and the report generators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::validation::ValidationError;

/// Opaque H3 cell address used as the join key across metric tables.
pub type HexagonId = String;

/// Allowed deviation of the weight sum from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// The three sourced metric dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    /// Grid connectivity.
    Grid,
    /// Network latency.
    Network,
    /// Average temperature.
    Temperature,
}

impl Dimension {
    /// All dimensions, in weight-vector order.
    pub const ALL: [Dimension; 3] = [Dimension::Grid, Dimension::Network, Dimension::Temperature];
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Grid => write!(f, "Grid"),
            Dimension::Network => write!(f, "Network"),
            Dimension::Temperature => write!(f, "Temperature"),
        }
    }
}

/// One row from one of the sourced metric tables.
///
/// Raw measurement fields are kept verbatim for display. The hexagon id is
/// lifted out of the row when it is a non-empty string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Join key; rows without one cannot take part in aggregation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hexagon_id: Option<HexagonId>,
    /// Raw row fields as returned by the store.
    pub fields: Map<String, Value>,
}

impl MetricRecord {
    /// An empty placeholder (all fields absent).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a record from a store row, reading the id from `id_field`.
    ///
    /// The id is kept verbatim so it matches the store's own id filters;
    /// blank ids are rejected.
    pub fn from_row(row: Map<String, Value>, id_field: &str) -> Self {
        let hexagon_id = row
            .get(id_field)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(String::from);

        Self {
            hexagon_id,
            fields: row,
        }
    }

    /// Build a record from an arbitrary JSON value. Non-object rows yield
    /// a record with no id.
    pub fn from_value(value: Value, id_field: &str) -> Self {
        match value {
            Value::Object(row) => Self::from_row(row, id_field),
            _ => Self::empty(),
        }
    }

    /// Read a normalized score field. Absent, null, non-numeric and
    /// non-finite values all count as unknown.
    pub fn normalized(&self, score_field: &str) -> Option<f64> {
        self.fields
            .get(score_field)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
    }
}

/// Three non-negative weights summing to one.
///
/// The only way to obtain one is [`WeightVector::new`], which enforces the
/// invariant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightVector {
    grid: f64,
    network: f64,
    temperature: f64,
}

impl WeightVector {
    /// Validate and build a weight vector.
    pub fn new(grid: f64, network: f64, temperature: f64) -> Result<Self, ValidationError> {
        for (dimension, value) in [
            (Dimension::Grid, grid),
            (Dimension::Network, network),
            (Dimension::Temperature, temperature),
        ] {
            if !value.is_finite() {
                return Err(ValidationError::NonFinite { dimension });
            }
            if value < 0.0 {
                return Err(ValidationError::Negative { dimension, value });
            }
        }

        let sum = grid + network + temperature;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ValidationError::Sum { sum });
        }

        Ok(Self {
            grid,
            network,
            temperature,
        })
    }

    pub fn grid(&self) -> f64 {
        self.grid
    }

    pub fn network(&self) -> f64 {
        self.network
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Weight for a given dimension.
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Grid => self.grid,
            Dimension::Network => self.network,
            Dimension::Temperature => self.temperature,
        }
    }
}

impl fmt::Display for WeightVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "grid={:.2}, network={:.2}, temperature={:.2}",
            self.grid, self.network, self.temperature
        )
    }
}

/// Per-dimension normalized sub-scores of one hexagon (`None` = unknown).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub grid: Option<f64>,
    pub network: Option<f64>,
    pub temperature: Option<f64>,
}

impl SubScores {
    pub fn get(&self, dimension: Dimension) -> Option<f64> {
        match dimension {
            Dimension::Grid => self.grid,
            Dimension::Network => self.network,
            Dimension::Temperature => self.temperature,
        }
    }

    /// True when no dimension has a known score.
    pub fn all_missing(&self) -> bool {
        self.grid.is_none() && self.network.is_none() && self.temperature.is_none()
    }
}

/// Composite score of one hexagon, recomputed on every evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HexagonScore {
    pub hexagon_id: HexagonId,
    /// Weighted sum of the sub-scores, missing ones counted as -1.
    pub raw_composite: f64,
    /// `raw_composite` mapped into [0, 1]; exactly 0 when nothing is known.
    pub normalized_composite: f64,
    pub sub_scores: SubScores,
    pub grid: MetricRecord,
    pub network: MetricRecord,
    pub temperature: MetricRecord,
}

impl HexagonScore {
    /// Source record for a dimension.
    pub fn record(&self, dimension: Dimension) -> &MetricRecord {
        match dimension {
            Dimension::Grid => &self.grid,
            Dimension::Network => &self.network,
            Dimension::Temperature => &self.temperature,
        }
    }
}

/// Sourced risk narrative for a location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Information {
    pub legislation: Vec<String>,
    pub construction_opposition: Vec<String>,
    pub environmental_challenges: Vec<String>,
}

impl Information {
    /// True when every section is empty.
    pub fn is_empty(&self) -> bool {
        self.legislation.is_empty()
            && self.construction_opposition.is_empty()
            && self.environmental_challenges.is_empty()
    }
}

/// Display record for one hexagon in the response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HexagonView {
    pub rank: usize,
    pub raw_composite: f64,
    pub normalized_composite: f64,
    pub sub_scores: SubScores,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
    pub grid: Map<String, Value>,
    pub network: Map<String, Value>,
    pub temperature: Map<String, Value>,
    /// Full-data row, when that variant is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

/// Final response document.
///
/// `highlighted` is always the hexagon id -> raw composite mapping of the
/// top entries; the plain id list is derivable from its keys.
#[derive(Debug, Clone, Serialize)]
pub struct SiteResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<WeightVector>,
    pub hexagons: BTreeMap<HexagonId, HexagonView>,
    pub highlighted: BTreeMap<HexagonId, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub information: Option<Information>,
}

/// Metadata about an evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Location the evaluation was requested for.
    pub location: String,
    pub evaluation_date: DateTime<Utc>,
    /// Model that produced the weights, or "manual" when overridden.
    pub weights_source: String,
    pub hexagons_scored: usize,
    /// Rows per table as reported by the store.
    pub table_counts: BTreeMap<String, String>,
    pub duration_seconds: f64,
}

/// The complete site evaluation report.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    /// Top entries in rank order.
    pub ranking: Vec<HexagonId>,
    #[serde(flatten)]
    pub body: SiteResponse,
}
