//! Composite score aggregation.
//!
//! Joins the grid, network and temperature tables on hexagon id and turns
//! the three normalized scores into one weighted composite per hexagon.

use crate::models::{Dimension, HexagonScore, MetricRecord, SubScores, WeightVector};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Value substituted for a missing normalized score.
pub const MISSING_SCORE: f64 = -1.0;

/// Name of the normalized-score field in each table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreFields {
    pub grid: String,
    pub network: String,
    pub temperature: String,
}

impl Default for ScoreFields {
    fn default() -> Self {
        Self {
            grid: "grid_score".to_string(),
            network: "network_score".to_string(),
            temperature: "temperature_score".to_string(),
        }
    }
}

impl ScoreFields {
    pub fn get(&self, dimension: Dimension) -> &str {
        match dimension {
            Dimension::Grid => &self.grid,
            Dimension::Network => &self.network,
            Dimension::Temperature => &self.temperature,
        }
    }
}

/// The three metric collections of one evaluation.
#[derive(Debug, Clone, Default)]
pub struct MetricTables {
    pub grid: Vec<MetricRecord>,
    pub network: Vec<MetricRecord>,
    pub temperature: Vec<MetricRecord>,
}

impl MetricTables {
    pub fn get(&self, dimension: Dimension) -> &[MetricRecord] {
        match dimension {
            Dimension::Grid => &self.grid,
            Dimension::Network => &self.network,
            Dimension::Temperature => &self.temperature,
        }
    }
}

/// Score every hexagon that appears in at least one table.
///
/// Missing records and missing scores count as [`MISSING_SCORE`]. Output is
/// ordered by ascending hexagon id, so identical inputs always produce
/// identical output. Weights are trusted as given.
pub fn aggregate(
    weights: &WeightVector,
    tables: &MetricTables,
    fields: &ScoreFields,
) -> Vec<HexagonScore> {
    let grid = index_records(Dimension::Grid, &tables.grid);
    let network = index_records(Dimension::Network, &tables.network);
    let temperature = index_records(Dimension::Temperature, &tables.temperature);

    let universe: BTreeSet<&str> = grid
        .keys()
        .chain(network.keys())
        .chain(temperature.keys())
        .copied()
        .collect();

    debug!("Scoring {} hexagons", universe.len());

    let empty = MetricRecord::empty();

    universe
        .into_iter()
        .map(|id| {
            let g = grid.get(id).copied().unwrap_or(&empty);
            let n = network.get(id).copied().unwrap_or(&empty);
            let t = temperature.get(id).copied().unwrap_or(&empty);
            score_hexagon(id, weights, fields, [g, n, t])
        })
        .collect()
}

/// Build the `id -> record` lookup for one table. Later duplicates win.
fn index_records(dimension: Dimension, records: &[MetricRecord]) -> BTreeMap<&str, &MetricRecord> {
    let mut index = BTreeMap::new();
    let mut dropped = 0usize;
    let mut duplicates = 0usize;

    for record in records {
        match record.hexagon_id.as_deref() {
            Some(id) => {
                if index.insert(id, record).is_some() {
                    duplicates += 1;
                }
            }
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!("{} table: dropped {} rows without a hexagon id", dimension, dropped);
    }
    if duplicates > 0 {
        warn!(
            "{} table: {} duplicate hexagon ids, keeping the last row of each",
            dimension, duplicates
        );
    }

    index
}

fn score_hexagon(
    id: &str,
    weights: &WeightVector,
    fields: &ScoreFields,
    records: [&MetricRecord; 3],
) -> HexagonScore {
    let [grid, network, temperature] = records;

    let sub_scores = SubScores {
        grid: grid.normalized(fields.get(Dimension::Grid)),
        network: network.normalized(fields.get(Dimension::Network)),
        temperature: temperature.normalized(fields.get(Dimension::Temperature)),
    };

    let raw_composite: f64 = Dimension::ALL
        .iter()
        .map(|&d| weights.get(d) * sub_scores.get(d).unwrap_or(MISSING_SCORE))
        .sum();

    let normalized_composite = if sub_scores.all_missing() {
        // Nothing known: never let the rescale lift "no data" above zero.
        0.0
    } else {
        ((raw_composite + 1.0) / 2.0).clamp(0.0, 1.0)
    };

    HexagonScore {
        hexagon_id: id.to_string(),
        raw_composite,
        normalized_composite,
        sub_scores,
        grid: grid.clone(),
        network: network.clone(),
        temperature: temperature.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const EPS: f64 = 1e-12;

    fn record(value: Value) -> MetricRecord {
        MetricRecord::from_value(value, "hexagon_id")
    }

    fn weights(g: f64, n: f64, t: f64) -> WeightVector {
        WeightVector::new(g, n, t).unwrap()
    }

    fn find<'a>(scores: &'a [HexagonScore], id: &str) -> &'a HexagonScore {
        scores.iter().find(|s| s.hexagon_id == id).unwrap()
    }

    #[test]
    fn test_half_known_hexagon() {
        let tables = MetricTables {
            grid: vec![record(json!({"hexagon_id": "A", "grid_score": 1.0}))],
            network: vec![record(json!({"hexagon_id": "A", "network_score": -1.0}))],
            temperature: vec![],
        };

        let scores = aggregate(&weights(0.5, 0.5, 0.0), &tables, &ScoreFields::default());

        assert_eq!(scores.len(), 1);
        let a = &scores[0];
        assert!(a.raw_composite.abs() < EPS);
        assert!((a.normalized_composite - 0.5).abs() < EPS);
        assert_eq!(a.sub_scores.temperature, None);
        assert!(a.temperature.fields.is_empty());
    }

    #[test]
    fn test_hexagon_without_any_score() {
        let tables = MetricTables {
            grid: vec![record(json!({"hexagon_id": "B", "grid_score": null, "connections": 3}))],
            network: vec![record(json!({"hexagon_id": "B", "latency_ms": 12.5}))],
            temperature: vec![],
        };

        let scores = aggregate(&weights(0.2, 0.3, 0.5), &tables, &ScoreFields::default());
        let b = find(&scores, "B");

        assert!((b.raw_composite + 1.0).abs() < EPS);
        assert_eq!(b.normalized_composite, 0.0);
        assert!(b.sub_scores.all_missing());
        assert_eq!(b.grid.fields["connections"], 3);
    }

    #[test]
    fn test_all_known_perfect_hexagon() {
        let third = 1.0 / 3.0;
        let tables = MetricTables {
            grid: vec![record(json!({"hexagon_id": "C", "grid_score": 1.0}))],
            network: vec![record(json!({"hexagon_id": "C", "network_score": 1.0}))],
            temperature: vec![record(json!({"hexagon_id": "C", "temperature_score": 1.0}))],
        };

        let scores = aggregate(&weights(third, third, third), &tables, &ScoreFields::default());
        let c = find(&scores, "C");

        assert!((c.raw_composite - 1.0).abs() < EPS);
        assert!((c.normalized_composite - 1.0).abs() < EPS);
    }

    #[test]
    fn test_universe_is_union_of_tables() {
        let tables = MetricTables {
            grid: vec![record(json!({"hexagon_id": "g1", "grid_score": 0.1}))],
            network: vec![record(json!({"hexagon_id": "n1", "network_score": 0.2}))],
            temperature: vec![
                record(json!({"hexagon_id": "t1", "temperature_score": 0.3})),
                record(json!({"hexagon_id": "g1", "temperature_score": 0.4})),
            ],
        };

        let scores = aggregate(&weights(0.4, 0.4, 0.2), &tables, &ScoreFields::default());
        let ids: Vec<_> = scores.iter().map(|s| s.hexagon_id.as_str()).collect();

        assert_eq!(ids, vec!["g1", "n1", "t1"]);
        assert!(!ids.contains(&"absent"));
    }

    #[test]
    fn test_rows_without_id_are_dropped() {
        let tables = MetricTables {
            grid: vec![
                record(json!({"grid_score": 1.0})),
                record(json!({"hexagon_id": "", "grid_score": 1.0})),
                record(json!({"hexagon_id": "x", "grid_score": 0.0})),
            ],
            ..MetricTables::default()
        };

        let scores = aggregate(&weights(1.0, 0.0, 0.0), &tables, &ScoreFields::default());
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].hexagon_id, "x");
    }

    #[test]
    fn test_duplicate_ids_last_row_wins() {
        let tables = MetricTables {
            grid: vec![
                record(json!({"hexagon_id": "d", "grid_score": -0.5})),
                record(json!({"hexagon_id": "d", "grid_score": 0.5})),
            ],
            ..MetricTables::default()
        };

        let scores = aggregate(&weights(1.0, 0.0, 0.0), &tables, &ScoreFields::default());
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].sub_scores.grid, Some(0.5));
    }

    #[test]
    fn test_normalized_stays_in_unit_range() {
        let values = [-1.0, -0.75, -0.2, 0.0, 0.33, 0.9, 1.0];
        let mut tables = MetricTables::default();
        for (i, g) in values.iter().enumerate() {
            for (j, n) in values.iter().enumerate() {
                let id = format!("h{}-{}", i, j);
                let t = values[(i + j) % values.len()];
                tables.grid.push(record(json!({"hexagon_id": &id, "grid_score": g})));
                tables.network.push(record(json!({"hexagon_id": &id, "network_score": n})));
                tables
                    .temperature
                    .push(record(json!({"hexagon_id": &id, "temperature_score": t})));
            }
        }

        for w in [weights(1.0, 0.0, 0.0), weights(0.2, 0.3, 0.5), weights(0.0, 0.25, 0.75)] {
            for score in aggregate(&w, &tables, &ScoreFields::default()) {
                assert!((0.0..=1.0).contains(&score.normalized_composite));
                assert!(score.raw_composite >= -1.0 - EPS && score.raw_composite <= 1.0 + EPS);
            }
        }
    }

    #[test]
    fn test_out_of_range_input_is_clamped() {
        let tables = MetricTables {
            grid: vec![record(json!({"hexagon_id": "hot", "grid_score": 3.0}))],
            ..MetricTables::default()
        };

        let scores = aggregate(&weights(1.0, 0.0, 0.0), &tables, &ScoreFields::default());
        assert_eq!(scores[0].normalized_composite, 1.0);
    }

    #[test]
    fn test_aggregate_is_deterministic() {
        let tables = MetricTables {
            grid: vec![
                record(json!({"hexagon_id": "z", "grid_score": 0.2})),
                record(json!({"hexagon_id": "a", "grid_score": 0.2})),
            ],
            network: vec![record(json!({"hexagon_id": "m", "network_score": 0.7}))],
            temperature: vec![record(json!({"hexagon_id": "a", "temperature_score": -0.3}))],
        };
        let w = weights(0.3, 0.3, 0.4);

        let first = aggregate(&w, &tables, &ScoreFields::default());
        let second = aggregate(&w, &tables, &ScoreFields::default());
        assert_eq!(first, second);
    }

    #[test]
    fn test_raising_one_dimension_never_lowers_raw() {
        let w = weights(0.25, 0.5, 0.25);
        let mut previous = f64::NEG_INFINITY;

        for step in 0..=20 {
            let network = -1.0 + step as f64 * 0.1;
            let tables = MetricTables {
                grid: vec![record(json!({"hexagon_id": "m", "grid_score": 0.4}))],
                network: vec![record(json!({"hexagon_id": "m", "network_score": network}))],
                temperature: vec![record(json!({"hexagon_id": "m", "temperature_score": -0.6}))],
            };
            let raw = aggregate(&w, &tables, &ScoreFields::default())[0].raw_composite;
            assert!(raw >= previous);
            previous = raw;
        }
    }

    #[test]
    fn test_custom_score_fields() {
        let fields = ScoreFields {
            grid: "grid_norm".to_string(),
            network: "latency_norm".to_string(),
            temperature: "temp_norm".to_string(),
        };
        let tables = MetricTables {
            grid: vec![record(json!({"hexagon_id": "c", "grid_norm": 0.0, "grid_score": 1.0}))],
            network: vec![record(json!({"hexagon_id": "c", "latency_norm": 0.0}))],
            temperature: vec![record(json!({"hexagon_id": "c", "temp_norm": 0.0}))],
        };

        let scores = aggregate(&weights(0.5, 0.25, 0.25), &tables, &fields);
        assert_eq!(scores[0].raw_composite, 0.0);
        assert_eq!(scores[0].normalized_composite, 0.5);
    }
}
