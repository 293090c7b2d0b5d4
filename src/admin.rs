//! Admin surface — cohort management and system statistics.
//!
//! Participants are created and deactivated here; deactivation is always a
//! soft flag so transcripts and analyses stay attached to their aggregate.
//! Consumers are trusted operators, so failures return structured detail.

use chrono::{Duration, NaiveDateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::models::Participant;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("Participant code '{0}' already exists")]
    DuplicateCode(String),

    #[error("Invalid participant code: '{0}'")]
    InvalidCode(String),

    #[error("Participant '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Validate a participant code before it becomes an immutable identity.
///
/// Codes are opaque but must be storable and loggable: alphanumeric start,
/// then alphanumeric/`._-`, at most 50 characters.
pub fn validate_participant_code(code: &str) -> Result<(), AdminError> {
    let valid =
        regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,49}$").expect("static regex");
    if !valid.is_match(code) {
        return Err(AdminError::InvalidCode(code.to_string()));
    }
    Ok(())
}

/// A participant plus its usage statistics, for the cohort listing.
#[derive(Debug, Clone)]
pub struct ParticipantDetail {
    pub participant: Participant,
    pub total_sessions: u64,
    pub total_messages: u64,
    pub last_activity: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemStats {
    pub total_participants: u64,
    pub active_participants: u64,
    pub total_sessions: u64,
    pub sessions_active_24h: u64,
    pub total_conversations: u64,
    pub total_messages: u64,
    pub messages_last_24h: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedOutcome {
    pub created: Vec<String>,
    pub skipped: Vec<String>,
}

/// Create a participant. Identity is immutable once created; a duplicate
/// code is rejected.
pub fn create_participant(
    conn: &Connection,
    code: &str,
    notes: Option<&str>,
    is_active: bool,
) -> Result<ParticipantDetail, AdminError> {
    validate_participant_code(code)?;
    if repository::get_participant_by_code(conn, code)?.is_some() {
        return Err(AdminError::DuplicateCode(code.to_string()));
    }

    let participant = Participant {
        id: Uuid::new_v4(),
        code: code.to_string(),
        is_active,
        notes: notes.map(|s| s.to_string()),
        created_at: Utc::now().naive_utc(),
    };
    repository::insert_participant(conn, &participant)?;
    tracing::info!(participant = %code, "participant created");

    Ok(ParticipantDetail {
        participant,
        total_sessions: 0,
        total_messages: 0,
        last_activity: None,
    })
}

/// All participants with per-participant usage statistics.
pub fn list_participants(
    conn: &Connection,
    include_inactive: bool,
) -> Result<Vec<ParticipantDetail>, AdminError> {
    let participants = repository::list_participants(conn, include_inactive)?;
    let mut details = Vec::with_capacity(participants.len());
    for participant in participants {
        details.push(detail_for(conn, participant)?);
    }
    Ok(details)
}

/// Update the mutable fields (active flag, notes). Identity never changes.
pub fn update_participant(
    conn: &Connection,
    code: &str,
    is_active: Option<bool>,
    notes: Option<&str>,
) -> Result<ParticipantDetail, AdminError> {
    let participant = repository::get_participant_by_code(conn, code)?
        .ok_or_else(|| AdminError::NotFound(code.to_string()))?;

    if let Some(active) = is_active {
        repository::set_participant_active(conn, &participant.id, active)?;
    }
    if let Some(notes) = notes {
        repository::set_participant_notes(conn, &participant.id, Some(notes))?;
    }

    let updated = repository::get_participant_by_code(conn, code)?
        .ok_or_else(|| AdminError::NotFound(code.to_string()))?;
    detail_for(conn, updated)
}

/// Soft-delete: flips the active flag, never removes the row.
pub fn deactivate_participant(conn: &Connection, code: &str) -> Result<(), AdminError> {
    let participant = repository::get_participant_by_code(conn, code)?
        .ok_or_else(|| AdminError::NotFound(code.to_string()))?;
    repository::set_participant_active(conn, &participant.id, false)?;
    tracing::info!(participant = %code, "participant deactivated");
    Ok(())
}

/// Create any missing participants from a configured code list; codes that
/// already exist are skipped, not modified.
pub fn seed_participants(conn: &Connection, codes: &[String]) -> Result<SeedOutcome, AdminError> {
    let mut outcome = SeedOutcome::default();
    for code in codes {
        if repository::get_participant_by_code(conn, code)?.is_some() {
            outcome.skipped.push(code.clone());
            continue;
        }
        create_participant(conn, code, Some("Seeded from configuration"), true)?;
        outcome.created.push(code.clone());
    }
    tracing::info!(
        created = outcome.created.len(),
        skipped = outcome.skipped.len(),
        "participant seed complete"
    );
    Ok(outcome)
}

/// Overall system statistics for the admin dashboard.
pub fn system_stats(conn: &Connection) -> Result<SystemStats, DatabaseError> {
    let day_ago = Utc::now().naive_utc() - Duration::hours(24);
    Ok(SystemStats {
        total_participants: repository::count_participants(conn, false)?,
        active_participants: repository::count_participants(conn, true)?,
        total_sessions: repository::count_sessions(conn)?,
        sessions_active_24h: repository::count_sessions_active_since(conn, day_ago)?,
        total_conversations: repository::count_distinct_conversations(conn)?,
        total_messages: repository::count_turns(conn)?,
        messages_last_24h: repository::count_turns_since(conn, day_ago)?,
    })
}

fn detail_for(conn: &Connection, participant: Participant) -> Result<ParticipantDetail, AdminError> {
    let total_sessions = repository::count_sessions_for(conn, &participant.id)?;
    let total_messages = repository::count_turns_for_participant(conn, &participant.id, None)?;
    let last_activity = repository::last_activity_for(conn, &participant.id)?;
    Ok(ParticipantDetail {
        participant,
        total_sessions,
        total_messages,
        last_activity,
    })
}
