// src/extract/validate.rs
//! Schema validation of model output. Two classes of failure: hard errors
//! reject outright, soft flags only reject when the model was also unsure.
//! The LLM is an external oracle — nothing it says is trusted past this gate.

use serde_json::Value;

use crate::event::{EventType, Scope, VerificationStatus};

/// Below this confidence a soft-flagged extraction is quarantined.
pub const MIN_CONFIDENCE: f64 = 0.3;

/// Default confidence when the model omitted the field entirely.
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// The schema-checked, normalized payload; cluster context is attached later.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPayload {
    pub summary: String,
    pub country: String,
    pub regions: Vec<String>,
    pub event_type: EventType,
    pub event_subtype: String,
    pub severity: i64,
    pub scope: Scope,
    pub verification_status: VerificationStatus,
    pub confidence: f64,
    pub actors: Vec<String>,
    pub rationale: String,
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Validate and normalize one parsed model response.
/// Err carries the reasons that send the raw output to quarantine.
pub fn validate_payload(value: &Value) -> Result<ValidatedPayload, Vec<String>> {
    let mut hard: Vec<String> = Vec::new();

    // country: required, must be a string.
    let country = match value.get("country") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => {
            hard.push("missing country".into());
            String::new()
        }
    };

    // eventType: must be one of the enum values.
    let event_type = match value.get("eventType").and_then(Value::as_str) {
        Some(raw) => match EventType::parse_str(raw) {
            Some(t) => Some(t),
            None => {
                hard.push(format!("invalid eventType: {raw}"));
                None
            }
        },
        None => {
            hard.push("missing eventType".into());
            None
        }
    };

    // severity: required number in 1..=5; fractional values are rounded.
    let severity = match value.get("severity").and_then(Value::as_f64) {
        Some(v) if (1.0..=5.0).contains(&v) => Some((v.round() as i64).clamp(1, 5)),
        Some(v) => {
            hard.push(format!("severity out of range: {v}"));
            None
        }
        None => {
            hard.push("missing severity".into());
            None
        }
    };

    // scope / verificationStatus: invalid-if-present is hard, absent defaults.
    let scope = match value.get("scope") {
        None | Some(Value::Null) => Scope::Local,
        Some(Value::String(raw)) => match Scope::parse_str(raw) {
            Some(s) => s,
            None => {
                hard.push(format!("invalid scope: {raw}"));
                Scope::Local
            }
        },
        Some(other) => {
            hard.push(format!("invalid scope: {other}"));
            Scope::Local
        }
    };

    let verification_status = match value.get("verificationStatus") {
        None | Some(Value::Null) => VerificationStatus::Reported,
        Some(Value::String(raw)) => match VerificationStatus::parse_str(raw) {
            Some(s) => s,
            None => {
                hard.push(format!("invalid verificationStatus: {raw}"));
                VerificationStatus::Reported
            }
        },
        Some(other) => {
            hard.push(format!("invalid verificationStatus: {other}"));
            VerificationStatus::Reported
        }
    };

    // confidence: out-of-range-if-present is hard, absent takes the default.
    let confidence = match value.get("confidence") {
        None | Some(Value::Null) => DEFAULT_CONFIDENCE,
        Some(v) => match v.as_f64() {
            Some(c) if (0.0..=1.0).contains(&c) => c,
            Some(c) => {
                hard.push(format!("confidence out of range: {c}"));
                0.0
            }
            None => {
                hard.push("confidence is not a number".into());
                0.0
            }
        },
    };

    if !hard.is_empty() {
        return Err(hard);
    }

    let regions = string_list(value, "regions");

    // Soft flags: only fatal in combination with low confidence.
    let mut soft: Vec<String> = Vec::new();
    if confidence < MIN_CONFIDENCE {
        soft.push(format!("low confidence: {confidence}"));
    }
    if regions.is_empty() {
        soft.push("missing regions".into());
    }
    if !soft.is_empty() && confidence < MIN_CONFIDENCE {
        return Err(soft);
    }

    Ok(ValidatedPayload {
        summary: string_field(value, "summary").unwrap_or_default(),
        country,
        regions,
        event_type: event_type.expect("checked above"),
        event_subtype: string_field(value, "eventSubtype")
            .unwrap_or_default()
            .trim()
            .to_lowercase(),
        severity: severity.expect("checked above"),
        scope,
        verification_status,
        confidence: confidence.clamp(0.0, 1.0),
        actors: string_list(value, "actors"),
        rationale: string_field(value, "rationale").unwrap_or_default(),
    })
}
