//! Natural-language summary of the highlighted hexagons.

use std::collections::BTreeMap;

use crate::geocode::PlaceResolver;
use crate::models::{HexagonId, HexagonScore};

/// Rendered summary plus the place names that went into it.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub text: String,
    /// Resolved names by hexagon id; empty when resolution is off.
    pub places: BTreeMap<HexagonId, String>,
}

/// Resolve place names (best effort) and render the summary.
///
/// Lookups run one after the other; a failed lookup shows the id instead.
pub async fn present(top: &[HexagonScore], resolver: Option<&dyn PlaceResolver>) -> Summary {
    let mut places = BTreeMap::new();

    if let Some(resolver) = resolver {
        for score in top {
            let place = resolver.resolve(&score.hexagon_id).await;
            places.insert(score.hexagon_id.clone(), place);
        }
    }

    Summary {
        text: render_summary(top, &places),
        places,
    }
}

/// Fixed-template summary text.
pub fn render_summary(top: &[HexagonScore], places: &BTreeMap<HexagonId, String>) -> String {
    if top.is_empty() {
        return "No candidate hexagons were found for this location. \
                Check that the metric tables contain data."
            .to_string();
    }

    let mut text = String::from("Here are the most suitable areas for your data center:\n");

    for score in top {
        let name = places
            .get(&score.hexagon_id)
            .map(String::as_str)
            .unwrap_or(&score.hexagon_id);
        text.push_str(&format!(
            "{} — score {:.2}\n",
            name, score.normalized_composite
        ));
    }

    text.push_str("Would you like more detail on one of these areas?");
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricRecord, SubScores};
    use async_trait::async_trait;

    fn score(id: &str, normalized: f64) -> HexagonScore {
        HexagonScore {
            hexagon_id: id.to_string(),
            raw_composite: normalized * 2.0 - 1.0,
            normalized_composite: normalized,
            sub_scores: SubScores::default(),
            grid: MetricRecord::empty(),
            network: MetricRecord::empty(),
            temperature: MetricRecord::empty(),
        }
    }

    struct KnownPlaces;

    #[async_trait]
    impl PlaceResolver for KnownPlaces {
        async fn resolve(&self, hexagon_id: &str) -> String {
            match hexagon_id {
                "a" => "Alençon".to_string(),
                other => other.to_string(),
            }
        }
    }

    #[test]
    fn test_render_with_ids() {
        let text = render_summary(&[score("a", 0.834), score("b", 0.5)], &BTreeMap::new());
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Here are"));
        assert_eq!(lines[1], "a — score 0.83");
        assert_eq!(lines[2], "b — score 0.50");
        assert!(lines[3].ends_with('?'));
    }

    #[test]
    fn test_render_empty() {
        let text = render_summary(&[], &BTreeMap::new());
        assert!(text.starts_with("No candidate hexagons"));
    }

    #[test]
    fn test_present_without_resolver() {
        let summary = tokio_test::block_on(present(&[score("a", 0.9)], None));
        assert!(summary.places.is_empty());
        assert!(summary.text.contains("a — score 0.90"));
    }

    #[test]
    fn test_present_with_resolver() {
        let top = [score("a", 0.9), score("zz", 0.1)];
        let summary = tokio_test::block_on(present(&top, Some(&KnownPlaces)));

        assert_eq!(summary.places["a"], "Alençon");
        assert!(summary.text.contains("Alençon — score 0.90"));
        assert!(summary.text.contains("zz — score 0.10"));
    }
}
