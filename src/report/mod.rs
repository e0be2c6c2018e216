//! Report rendering.

pub mod generator;
pub mod presenter;

pub use generator::{generate_json_report, generate_markdown_report};
pub use presenter::present;
