//! Defensive parsing of the analysis model's free-text response.
//!
//! The response should contain exactly one JSON object, but models add
//! commentary, fence markers, and partially-wrong fields. Extraction policy:
//! take the substring from the first `{` to the last `}` and parse that;
//! inside the object, tolerate bad array items individually. A response with
//! no parseable object degrades to a fallback record — never an error — so
//! every run still produces a reviewable artifact.

use serde::Deserialize;
use serde_json::Value;

use crate::models::{AdherenceExtraction, OverallAdherence, TimingSchedule};

/// Summary recorded when the response carries no parseable JSON object.
pub const PARSE_FAILURE_SUMMARY: &str =
    "Error parsing model response. Raw response stored for review.";

/// Summary used when the model omitted one.
pub const DEFAULT_SUMMARY: &str = "Analysis completed.";

/// Parse the model response, falling back to a minimal zero-confidence
/// record when no JSON object can be extracted.
pub fn parse_extraction(response: &str) -> AdherenceExtraction {
    match try_parse(response) {
        Some(extraction) => extraction,
        None => {
            tracing::warn!("analysis response carried no parseable JSON object");
            fallback_extraction()
        }
    }
}

/// The minimal record persisted when extraction fails: zero confidence,
/// a fixed parsing-error summary, and all-null adherence fields.
pub fn fallback_extraction() -> AdherenceExtraction {
    AdherenceExtraction {
        medications: Vec::new(),
        timing_schedule: TimingSchedule::default(),
        side_effects: Vec::new(),
        adherence_difficulties: Vec::new(),
        adherence_strategies: Vec::new(),
        questions_concerns: Vec::new(),
        overall_adherence: OverallAdherence::default(),
        confidence_score: 0,
        summary: PARSE_FAILURE_SUMMARY.to_string(),
        key_concerns: Vec::new(),
        recommendations: Vec::new(),
    }
}

fn try_parse(response: &str) -> Option<AdherenceExtraction> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }

    let raw: RawExtraction = serde_json::from_str(&response[start..=end]).ok()?;

    Some(AdherenceExtraction {
        medications: parse_array_lenient(raw.medications.as_deref()),
        timing_schedule: raw
            .timing_schedule
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default(),
        side_effects: parse_array_lenient(raw.side_effects.as_deref()),
        adherence_difficulties: parse_array_lenient(raw.adherence_difficulties.as_deref()),
        adherence_strategies: parse_array_lenient(raw.adherence_strategies.as_deref()),
        questions_concerns: parse_array_lenient(raw.questions_concerns.as_deref()),
        overall_adherence: raw
            .overall_adherence
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default(),
        confidence_score: parse_confidence(raw.confidence_score.as_ref()),
        summary: raw
            .summary
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
        key_concerns: parse_string_array(raw.key_concerns.as_deref()),
        recommendations: parse_string_array(raw.recommendations.as_deref()),
    })
}

/// Raw top-level shape: everything optional, arrays kept as loose values so
/// a single malformed item cannot sink the document.
#[derive(Deserialize)]
struct RawExtraction {
    #[serde(default)]
    medications: Option<Vec<Value>>,
    #[serde(default)]
    timing_schedule: Option<Value>,
    #[serde(default)]
    side_effects: Option<Vec<Value>>,
    #[serde(default)]
    adherence_difficulties: Option<Vec<Value>>,
    #[serde(default)]
    adherence_strategies: Option<Vec<Value>>,
    #[serde(default)]
    questions_concerns: Option<Vec<Value>>,
    #[serde(default)]
    overall_adherence: Option<Value>,
    #[serde(default)]
    confidence_score: Option<Value>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    key_concerns: Option<Vec<Value>>,
    #[serde(default)]
    recommendations: Option<Vec<Value>>,
}

/// Parse an array leniently — skip items that fail to deserialize.
fn parse_array_lenient<T: for<'de> Deserialize<'de>>(items: Option<&[Value]>) -> Vec<T> {
    match items {
        None => vec![],
        Some(arr) => arr
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect(),
    }
}

fn parse_string_array(items: Option<&[Value]>) -> Vec<String> {
    match items {
        None => vec![],
        Some(arr) => arr
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
    }
}

/// Confidence may arrive as a number or a numeric string; clamp to 0–100.
fn parse_confidence(value: Option<&Value>) -> u8 {
    let score = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    score.clamp(0.0, 100.0).round() as u8
}
