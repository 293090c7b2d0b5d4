//! Adherence Analyzer — a retrospective NLP pass over the transcript store.
//!
//! One run walks Fetching → Prompting → Parsing → Persisted. The only hard
//! failure is an empty fetch (unknown participant or zero turns in the
//! window); a malformed model response degrades to a fallback record so the
//! run always persists a reviewable artifact. Runs out-of-band, independent
//! of live chat, and holds no state between calls.

pub mod parser;
pub mod prompt;

pub use parser::{fallback_extraction, parse_extraction, PARSE_FAILURE_SUMMARY};
pub use prompt::{build_analysis_prompt, render_transcript, ANALYSIS_SYSTEM_PROMPT};

use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::gateway::{ChatMessage, GatewayError, ModelGateway};
use crate::models::{AdherenceAnalysis, AdherenceExtraction};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Participant '{0}' not found")]
    ParticipantNotFound(String),

    #[error("No conversation turns in the requested window")]
    EmptyWindow,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Half-open time window `[start, end)`; either bound may be absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisWindow {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl AnalysisWindow {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn between(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        Self { start, end }
    }
}

/// Run one adherence analysis for a participant and persist the result.
///
/// The returned row records the actual extent of the turns analyzed
/// (earliest/latest included timestamps), the turn count, the structured
/// extraction, and the verbatim model response.
pub async fn run_analysis(
    conn: &Connection,
    gateway: &ModelGateway,
    participant_code: &str,
    window: AnalysisWindow,
    model: &str,
) -> Result<AdherenceAnalysis, AnalysisError> {
    // Fetching
    let participant = repository::get_participant_by_code(conn, participant_code)?
        .ok_or_else(|| AnalysisError::ParticipantNotFound(participant_code.to_string()))?;

    let turns = repository::turns_in_window(conn, &participant.id, window.start, window.end)?;
    if turns.is_empty() {
        return Err(AnalysisError::EmptyWindow);
    }
    // Turns are chronological; the bounds are the observed extent.
    let analyzed_from = turns[0].timestamp;
    let analyzed_to = turns[turns.len() - 1].timestamp;
    let turn_count = turns.len() as u32;

    // Prompting
    let transcript = render_transcript(&turns);
    let messages = vec![
        ChatMessage::system(ANALYSIS_SYSTEM_PROMPT),
        ChatMessage::user(build_analysis_prompt(&transcript)),
    ];
    tracing::info!(
        participant = %participant_code,
        turns = turn_count,
        model = %model,
        "running adherence analysis"
    );
    let response = gateway.generate(model, &messages).await?;

    // Parsing — malformed output degrades, it never aborts the run.
    let extraction = parse_extraction(&response);

    // Persisted
    let analysis = build_record(
        participant.id,
        analyzed_from,
        analyzed_to,
        turn_count,
        &extraction,
        response,
        model,
    );
    repository::insert_analysis(conn, &analysis)?;
    Ok(analysis)
}

/// Most recent analysis for a participant; `None` for an unknown participant.
pub fn latest_analysis(
    conn: &Connection,
    participant_code: &str,
) -> Result<Option<AdherenceAnalysis>, DatabaseError> {
    let Some(participant) = repository::get_participant_by_code(conn, participant_code)? else {
        return Ok(None);
    };
    repository::latest_analysis_for(conn, &participant.id)
}

/// Most recent N analyses, newest first; empty for an unknown participant.
pub fn analysis_history(
    conn: &Connection,
    participant_code: &str,
    limit: u32,
) -> Result<Vec<AdherenceAnalysis>, DatabaseError> {
    let Some(participant) = repository::get_participant_by_code(conn, participant_code)? else {
        return Ok(Vec::new());
    };
    repository::analysis_history_for(conn, &participant.id, limit)
}

fn build_record(
    participant_id: Uuid,
    analyzed_from: NaiveDateTime,
    analyzed_to: NaiveDateTime,
    turn_count: u32,
    extraction: &AdherenceExtraction,
    raw_response: String,
    model: &str,
) -> AdherenceAnalysis {
    AdherenceAnalysis {
        id: Uuid::new_v4(),
        participant_id,
        analysis_date: Utc::now().naive_utc(),
        analyzed_from,
        analyzed_to,
        turn_count,
        is_taking_medications: extraction.overall_adherence.taking_medications,
        taking_as_prescribed: extraction.overall_adherence.taking_as_prescribed,
        taking_correct_medications: extraction.overall_adherence.taking_correct_medications,
        medication_list: to_json_array(&extraction.medications),
        side_effects: to_json_array(&extraction.side_effects),
        adherence_barriers: to_json_array(&extraction.adherence_difficulties),
        adherence_strategies: to_json_array(&extraction.adherence_strategies),
        confidence_score: extraction.confidence_score,
        summary: extraction.summary.clone(),
        detailed_analysis: raw_response,
        model_used: model.to_string(),
    }
}

fn to_json_array<T: serde::Serialize>(items: &[T]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}
