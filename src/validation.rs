//! Validation of untrusted agent output.
//!
//! The research agent answers in free text. Payloads are first extracted as
//! a JSON object, then checked against a strict schema (unknown, missing or
//! non-numeric fields are rejected), and only then handed to the
//! [`WeightVector`] constructor, which guards the sum-to-one invariant.

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::models::{Dimension, Information, WeightVector};

/// Reasons an agent payload can be rejected.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("no JSON object found in agent output")]
    NoPayload,

    #[error("schema validation failed: {0}")]
    Schema(String),

    #[error("{dimension} weight is not a finite number")]
    NonFinite { dimension: Dimension },

    #[error("{dimension} weight is negative ({value})")]
    Negative { dimension: Dimension, value: f64 },

    #[error("weights sum to {sum}, expected 1.0")]
    Sum { sum: f64 },
}

/// Wire schema of the scoring task.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WeightPayload {
    score_grid: f64,
    score_network: f64,
    score_temperature: f64,
}

/// Validate a provisional scoring payload into a weight vector.
pub fn validate_weights(payload: &Value) -> Result<WeightVector, ValidationError> {
    let parsed: WeightPayload = serde_json::from_value(payload.clone())
        .map_err(|e| ValidationError::Schema(e.to_string()))?;

    WeightVector::new(
        parsed.score_grid,
        parsed.score_network,
        parsed.score_temperature,
    )
}

/// Validate a provisional risk-narrative payload.
pub fn validate_information(payload: &Value) -> Result<Information, ValidationError> {
    serde_json::from_value(payload.clone()).map_err(|e| ValidationError::Schema(e.to_string()))
}

/// JSON schema shown to the model for the scoring task.
pub fn weights_schema() -> Value {
    json!({
        "title": "Scorer",
        "type": "object",
        "properties": {
            "score_grid": {"type": "number", "minimum": 0, "maximum": 1},
            "score_network": {"type": "number", "minimum": 0, "maximum": 1},
            "score_temperature": {"type": "number", "minimum": 0, "maximum": 1}
        },
        "required": ["score_grid", "score_network", "score_temperature"],
        "additionalProperties": false
    })
}

/// JSON schema shown to the model for the information task.
pub fn information_schema() -> Value {
    let list = json!({"type": "array", "items": {"type": "string"}});
    json!({
        "title": "Information",
        "type": "object",
        "properties": {
            "legislation": list,
            "construction_opposition": list,
            "environmental_challenges": list
        },
        "required": ["legislation", "construction_opposition", "environmental_challenges"],
        "additionalProperties": false
    })
}

/// Pull the first JSON object out of free-form model output.
///
/// Tries the whole text, then a fenced code block, then the span between
/// the first `{` and the last `}`.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    let mut candidates: Vec<&str> = vec![trimmed];

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(end) = body.find("```") {
            candidates.push(body[..end].trim());
        }
    }

    if let (Some(open), Some(close)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if open < close {
            candidates.push(&trimmed[open..=close]);
        }
    }

    candidates
        .into_iter()
        .filter_map(|c| serde_json::from_str::<Value>(c).ok())
        .find(Value::is_object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_weights_ok() {
        let weights = validate_weights(&json!({
            "score_grid": 0.5,
            "score_network": 0.3,
            "score_temperature": 0.2
        }))
        .unwrap();
        assert_eq!(weights.grid(), 0.5);
        assert_eq!(weights.network(), 0.3);
    }

    #[test]
    fn test_validate_weights_accepts_integers() {
        let weights = validate_weights(&json!({
            "score_grid": 1,
            "score_network": 0,
            "score_temperature": 0
        }))
        .unwrap();
        assert_eq!(weights.grid(), 1.0);
    }

    #[test]
    fn test_validate_weights_rejects_unknown_field() {
        let err = validate_weights(&json!({
            "score_grid": 0.5,
            "score_network": 0.3,
            "score_temperature": 0.2,
            "score_water": 0.0
        }))
        .unwrap_err();
        assert!(matches!(err, ValidationError::Schema(_)));
    }

    #[test]
    fn test_validate_weights_rejects_missing_and_text() {
        assert!(matches!(
            validate_weights(&json!({"score_grid": 0.5, "score_network": 0.5})),
            Err(ValidationError::Schema(_))
        ));
        assert!(matches!(
            validate_weights(&json!({
                "score_grid": "0.5",
                "score_network": 0.3,
                "score_temperature": 0.2
            })),
            Err(ValidationError::Schema(_))
        ));
    }

    #[test]
    fn test_validate_weights_checks_sum_separately() {
        // Schema-valid but violates the cross-field invariant.
        let err = validate_weights(&json!({
            "score_grid": 0.6,
            "score_network": 0.6,
            "score_temperature": 0.2
        }))
        .unwrap_err();
        assert!(matches!(err, ValidationError::Sum { .. }));
    }

    #[test]
    fn test_validate_information() {
        let info = validate_information(&json!({
            "legislation": ["Décret 2023-1 on data-center heat reuse"],
            "construction_opposition": [],
            "environmental_challenges": ["Drought restrictions in 2022"]
        }))
        .unwrap();
        assert_eq!(info.legislation.len(), 1);
        assert!(info.construction_opposition.is_empty());

        assert!(validate_information(&json!({"legislation": []})).is_err());
    }

    #[test]
    fn test_extract_plain_json() {
        let value = extract_json_object(r#"{"score_grid": 0.4}"#).unwrap();
        assert_eq!(value["score_grid"], 0.4);
    }

    #[test]
    fn test_extract_fenced_json() {
        let text = "Here you go:\n```json\n{\"score_grid\": 0.4}\n```\nDone.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["score_grid"], 0.4);
    }

    #[test]
    fn test_extract_embedded_json() {
        let text = "The final weights are {\"score_grid\": 0.7, \"score_network\": 0.2} as computed.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["score_network"], 0.2);
    }

    #[test]
    fn test_extract_nothing() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("[1, 2, 3]").is_none());
    }
}
