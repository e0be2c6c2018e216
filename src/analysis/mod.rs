//! Hexagon scoring.
//!
//! Aggregation joins the metric tables into composite scores, selection
//! ranks them, and the pipeline ties both to the metric store.

pub mod aggregator;
pub mod pipeline;
pub mod selector;

pub use aggregator::ScoreFields;
pub use pipeline::SiteEvaluator;
