//! Ranking and top-K selection of scored hexagons.

use crate::models::{HexagonId, HexagonScore};
use std::cmp::Ordering;

/// Sort scores by raw composite, highest first.
///
/// The sort is stable: tied hexagons keep their incoming order.
pub fn rank(scores: &mut [HexagonScore]) {
    scores.sort_by(|a, b| {
        b.raw_composite
            .partial_cmp(&a.raw_composite)
            .unwrap_or(Ordering::Equal)
    });
}

/// Rank the scores and keep the best `k`.
///
/// Returns the selected ids alongside their full records, both in rank
/// order. `k == 0` selects nothing.
pub fn select_top_k(mut scores: Vec<HexagonScore>, k: usize) -> (Vec<HexagonId>, Vec<HexagonScore>) {
    rank(&mut scores);
    scores.truncate(k);

    let ids = scores.iter().map(|s| s.hexagon_id.clone()).collect();
    (ids, scores)
}
