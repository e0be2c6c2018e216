//! One site evaluation, from store rows to a ranked response.
//!
//! The evaluator fetches the three metric tables concurrently, scores every
//! hexagon, keeps the top entries and optionally pulls their full rows.
//! Agent payloads enter through [`weights_from_agent`] and
//! [`information_from_agent`], which are the only places untrusted output
//! is turned into typed values.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::aggregator::{aggregate, MetricTables};
use super::selector::select_top_k;
use crate::agent::Researcher;
use crate::config::StoreConfig;
use crate::error::SiteError;
use crate::models::{
    Dimension, HexagonId, HexagonScore, HexagonView, Information, MetricRecord, SiteResponse,
    WeightVector,
};
use crate::store::rest::total_from_content_range;
use crate::store::{MetricStore, StoreError};
use crate::validation::{validate_information, validate_weights, ValidationError};

/// Result of scoring one request.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Number of hexagons scored (the union of the three tables).
    pub scored: usize,
    /// Top entries, best first.
    pub top: Vec<HexagonScore>,
    /// Full rows of the top entries, when requested.
    pub details: BTreeMap<HexagonId, Map<String, Value>>,
    /// Total rows per table, keyed by table name.
    pub table_counts: BTreeMap<String, String>,
}

impl Evaluation {
    /// Ids of the top entries in rank order.
    pub fn ranking(&self) -> Vec<HexagonId> {
        self.top.iter().map(|s| s.hexagon_id.clone()).collect()
    }

    /// Highlighted entries as id -> raw composite.
    pub fn highlighted(&self) -> BTreeMap<HexagonId, f64> {
        self.top
            .iter()
            .map(|s| (s.hexagon_id.clone(), s.raw_composite))
            .collect()
    }

    /// Display records of the top entries.
    pub fn views(&self, places: &BTreeMap<HexagonId, String>) -> BTreeMap<HexagonId, HexagonView> {
        self.top
            .iter()
            .enumerate()
            .map(|(i, score)| {
                let fields = |d: Dimension| score.record(d).fields.clone();
                let view = HexagonView {
                    rank: i + 1,
                    raw_composite: score.raw_composite,
                    normalized_composite: score.normalized_composite,
                    sub_scores: score.sub_scores,
                    place: places.get(&score.hexagon_id).cloned(),
                    grid: fields(Dimension::Grid),
                    network: fields(Dimension::Network),
                    temperature: fields(Dimension::Temperature),
                    details: self.details.get(&score.hexagon_id).cloned(),
                };
                (score.hexagon_id.clone(), view)
            })
            .collect()
    }

    /// Assemble the final response document.
    pub fn into_response(
        self,
        summary: String,
        places: &BTreeMap<HexagonId, String>,
        weights: WeightVector,
        information: Option<Information>,
    ) -> SiteResponse {
        SiteResponse {
            response: summary,
            weights: Some(weights),
            hexagons: self.views(places),
            highlighted: self.highlighted(),
            information,
        }
    }
}

/// Scores hexagons against one metric store.
pub struct SiteEvaluator<'a> {
    store: &'a dyn MetricStore,
    config: &'a StoreConfig,
}

impl<'a> SiteEvaluator<'a> {
    pub fn new(store: &'a dyn MetricStore, config: &'a StoreConfig) -> Self {
        Self { store, config }
    }

    /// Fetch the three metric tables concurrently.
    ///
    /// Any table failing fails the whole fetch; no partial data is returned.
    pub async fn fetch_tables(
        &self,
    ) -> Result<(MetricTables, BTreeMap<String, String>), SiteError> {
        let (grid, network, temperature) = futures::try_join!(
            self.fetch_table(Dimension::Grid),
            self.fetch_table(Dimension::Network),
            self.fetch_table(Dimension::Temperature),
        )?;

        let tables = MetricTables {
            grid: grid.0,
            network: network.0,
            temperature: temperature.0,
        };

        let mut counts = BTreeMap::new();
        for (dimension, total) in Dimension::ALL.into_iter().zip([grid.1, network.1, temperature.1]) {
            debug!(
                "{} table: {} rows fetched, {} in store",
                dimension,
                tables.get(dimension).len(),
                total
            );
            counts.insert(self.config.table(dimension).name.clone(), total);
        }

        Ok((tables, counts))
    }

    /// Score every hexagon and keep the best `top_k`.
    pub async fn evaluate(
        &self,
        weights: &WeightVector,
        top_k: usize,
        full_data: bool,
    ) -> Result<Evaluation, SiteError> {
        let full_data_table = match (full_data, self.config.full_data_table.as_deref()) {
            (true, None) => {
                return Err(SiteError::Config(
                    "--full-data requires store.full_data_table".to_string(),
                ))
            }
            (true, Some(table)) => Some(table),
            (false, _) => None,
        };

        let (tables, table_counts) = self.fetch_tables().await?;

        let scores = aggregate(weights, &tables, &self.config.score_fields());
        let scored = scores.len();
        info!("Scored {} hexagons with {}", scored, weights);

        let (ids, top) = select_top_k(scores, top_k);

        let details = match full_data_table {
            Some(table) => self.fetch_details(table, &ids).await?,
            None => BTreeMap::new(),
        };

        Ok(Evaluation {
            scored,
            top,
            details,
            table_counts,
        })
    }

    async fn fetch_table(
        &self,
        dimension: Dimension,
    ) -> Result<(Vec<MetricRecord>, String), StoreError> {
        let table = &self.config.table(dimension).name;
        let result = self.store.fetch(table, None).await?;

        let reported = result
            .total_count
            .as_deref()
            .and_then(total_from_content_range);
        if let Some(reported) = reported {
            if (result.rows.len() as u64) < reported {
                return Err(StoreError::Incomplete {
                    table: table.clone(),
                    fetched: result.rows.len(),
                    total: reported,
                });
            }
        }
        let total = reported
            .map(|t| t.to_string())
            .unwrap_or_else(|| result.rows.len().to_string());

        let records = result
            .rows
            .into_iter()
            .map(|row| MetricRecord::from_value(row, &self.config.id_field))
            .collect();

        Ok((records, total))
    }

    /// Full rows for the selected ids, keyed by id.
    async fn fetch_details(
        &self,
        table: &str,
        ids: &[HexagonId],
    ) -> Result<BTreeMap<HexagonId, Map<String, Value>>, SiteError> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let result = self.store.fetch(table, Some(ids)).await?;

        let details: BTreeMap<_, _> = result
            .objects()
            .map(|row| MetricRecord::from_row(row, &self.config.id_field))
            .filter_map(|record| record.hexagon_id.map(|id| (id, record.fields)))
            .collect();

        if details.len() < ids.len() {
            warn!(
                "{}: full rows found for {} of {} hexagons",
                table,
                details.len(),
                ids.len()
            );
        }

        Ok(details)
    }
}

/// Rejected payloads stay validation errors; anything else is an agent failure.
fn agent_error(error: anyhow::Error) -> SiteError {
    match error.downcast::<ValidationError>() {
        Ok(rejection) => SiteError::Validation(rejection),
        Err(error) => SiteError::Agent(error),
    }
}

/// Ask the researcher for weights and validate them.
pub async fn weights_from_agent(
    researcher: &dyn Researcher,
    location: &str,
) -> Result<WeightVector, SiteError> {
    let payload = researcher
        .produce_weights(location)
        .await
        .map_err(agent_error)?;
    debug!("Weight payload: {}", payload);

    let weights = validate_weights(&payload)?;
    info!("Agent weights for {}: {}", location, weights);
    Ok(weights)
}

/// Ask the researcher for the risk briefing and validate it.
pub async fn information_from_agent(
    researcher: &dyn Researcher,
    location: &str,
) -> Result<Information, SiteError> {
    let payload = researcher
        .research_risks(location)
        .await
        .map_err(agent_error)?;

    let information = validate_information(&payload)?;
    if information.is_empty() {
        warn!("Risk briefing for {} is empty", location);
    }
    Ok(information)
}
