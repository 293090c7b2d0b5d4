use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::AdherenceAnalysis;

use super::participant::parse_uuid;

const ANALYSIS_COLUMNS: &str = "id, participant_id, analysis_date, analyzed_from, analyzed_to,
     turn_count, is_taking_medications, taking_as_prescribed, taking_correct_medications,
     medication_list, side_effects, adherence_barriers, adherence_strategies,
     confidence_score, summary, detailed_analysis, model_used";

pub fn insert_analysis(conn: &Connection, a: &AdherenceAnalysis) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO adherence_analyses
         (id, participant_id, analysis_date, analyzed_from, analyzed_to,
          turn_count, is_taking_medications, taking_as_prescribed, taking_correct_medications,
          medication_list, side_effects, adherence_barriers, adherence_strategies,
          confidence_score, summary, detailed_analysis, model_used)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            a.id.to_string(),
            a.participant_id.to_string(),
            a.analysis_date,
            a.analyzed_from,
            a.analyzed_to,
            a.turn_count,
            a.is_taking_medications,
            a.taking_as_prescribed,
            a.taking_correct_medications,
            a.medication_list,
            a.side_effects,
            a.adherence_barriers,
            a.adherence_strategies,
            a.confidence_score as i64,
            a.summary,
            a.detailed_analysis,
            a.model_used,
        ],
    )?;
    Ok(())
}

/// Most recent analysis for a participant, by analysis timestamp.
pub fn latest_analysis_for(
    conn: &Connection,
    participant_id: &Uuid,
) -> Result<Option<AdherenceAnalysis>, DatabaseError> {
    let sql = format!(
        "SELECT {ANALYSIS_COLUMNS} FROM adherence_analyses
         WHERE participant_id = ?1
         ORDER BY analysis_date DESC, rowid DESC LIMIT 1"
    );
    let result = conn.query_row(&sql, params![participant_id.to_string()], analysis_from_row);

    match result {
        Ok(a) => Ok(Some(a)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Most recent N analyses for a participant, newest first.
pub fn analysis_history_for(
    conn: &Connection,
    participant_id: &Uuid,
    limit: u32,
) -> Result<Vec<AdherenceAnalysis>, DatabaseError> {
    let sql = format!(
        "SELECT {ANALYSIS_COLUMNS} FROM adherence_analyses
         WHERE participant_id = ?1
         ORDER BY analysis_date DESC, rowid DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![participant_id.to_string(), limit as i64],
        analysis_from_row,
    )?;

    let mut analyses = Vec::new();
    for row in rows {
        analyses.push(row?);
    }
    Ok(analyses)
}

fn analysis_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AdherenceAnalysis> {
    Ok(AdherenceAnalysis {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        participant_id: parse_uuid(&row.get::<_, String>(1)?)?,
        analysis_date: row.get::<_, NaiveDateTime>(2)?,
        analyzed_from: row.get::<_, NaiveDateTime>(3)?,
        analyzed_to: row.get::<_, NaiveDateTime>(4)?,
        turn_count: row.get::<_, i64>(5)? as u32,
        is_taking_medications: row.get(6)?,
        taking_as_prescribed: row.get(7)?,
        taking_correct_medications: row.get(8)?,
        medication_list: row.get(9)?,
        side_effects: row.get(10)?,
        adherence_barriers: row.get(11)?,
        adherence_strategies: row.get(12)?,
        confidence_score: row.get::<_, i64>(13)?.clamp(0, 100) as u8,
        summary: row.get(14)?,
        detailed_analysis: row.get(15)?,
        model_used: row.get(16)?,
    })
}
