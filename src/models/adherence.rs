//! Medication-adherence analysis records and the extraction schema.
//!
//! `AdherenceAnalysis` is the persisted row (one per run, immutable).
//! The remaining types mirror the JSON document the analysis model is asked
//! to produce; they deserialize leniently because the producer is a language
//! model, not a trusted client.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Persisted result of one adherence-analysis run.
///
/// Re-running for the same window creates a new row; the audit trail of
/// repeated provider review is kept intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdherenceAnalysis {
    pub id: Uuid,
    pub participant_id: Uuid,
    pub analysis_date: NaiveDateTime,
    /// Earliest turn timestamp included in the analysis.
    pub analyzed_from: NaiveDateTime,
    /// Latest turn timestamp included in the analysis.
    pub analyzed_to: NaiveDateTime,
    pub turn_count: u32,
    pub is_taking_medications: Option<bool>,
    pub taking_as_prescribed: Option<bool>,
    pub taking_correct_medications: Option<bool>,
    /// JSON array of `MedicationInfo`.
    pub medication_list: String,
    /// JSON array of `SideEffect`.
    pub side_effects: String,
    /// JSON array of `AdherenceDifficulty`.
    pub adherence_barriers: String,
    /// JSON array of `AdherenceStrategy`.
    pub adherence_strategies: String,
    /// 0–100 confidence in the extraction.
    pub confidence_score: u8,
    pub summary: String,
    /// Verbatim model response, kept for manual review.
    pub detailed_analysis: String,
    pub model_used: String,
}

// ──────────────────────────────────────────────
// Extraction schema
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationInfo {
    pub name: String,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default = "default_true")]
    pub mentioned_by_patient: bool,
}

fn default_true() -> bool {
    true
}

/// Time-of-day buckets for when medications are taken.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingSchedule {
    #[serde(default)]
    pub morning: Vec<String>,
    #[serde(default)]
    pub afternoon: Vec<String>,
    #[serde(default)]
    pub evening: Vec<String>,
    #[serde(default)]
    pub as_needed: Vec<String>,
    #[serde(default)]
    pub unclear: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SideEffectSeverity {
    Mild,
    Moderate,
    Severe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideEffect {
    pub medication: String,
    pub effect: String,
    pub severity: SideEffectSeverity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdherenceDifficulty {
    /// forgetting / cost / access / side_effects / complexity / other
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyEffectiveness {
    #[serde(rename = "working well")]
    WorkingWell,
    #[serde(rename = "somewhat helpful")]
    SomewhatHelpful,
    #[serde(rename = "not working")]
    NotWorking,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdherenceStrategy {
    /// alarm / pill_box / routine / caregiver_help / other
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub effectiveness: StrategyEffectiveness,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionConcern {
    pub topic: String,
    pub question: String,
    #[serde(default)]
    pub addressed: bool,
}

/// Three-field overall adherence summary.
///
/// Each field is a tri-state: the model answers true/false/"unclear", and
/// anything that is not a plain boolean collapses to `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverallAdherence {
    #[serde(default, deserialize_with = "tri_state_bool")]
    pub taking_medications: Option<bool>,
    #[serde(default, deserialize_with = "tri_state_bool")]
    pub taking_as_prescribed: Option<bool>,
    #[serde(default, deserialize_with = "tri_state_bool")]
    pub taking_correct_medications: Option<bool>,
}

/// Accept `true`/`false` as-is and anything else ("unclear", null, a stray
/// string) as `None` rather than failing the whole document.
fn tri_state_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_bool())
}

/// The complete extraction document assembled by the parser.
#[derive(Debug, Clone, Serialize)]
pub struct AdherenceExtraction {
    pub medications: Vec<MedicationInfo>,
    pub timing_schedule: TimingSchedule,
    pub side_effects: Vec<SideEffect>,
    pub adherence_difficulties: Vec<AdherenceDifficulty>,
    pub adherence_strategies: Vec<AdherenceStrategy>,
    pub questions_concerns: Vec<QuestionConcern>,
    pub overall_adherence: OverallAdherence,
    pub confidence_score: u8,
    pub summary: String,
    pub key_concerns: Vec<String>,
    pub recommendations: Vec<String>,
}
