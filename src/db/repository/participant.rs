use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::Participant;

pub fn insert_participant(conn: &Connection, p: &Participant) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO participants (id, code, is_active, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            p.id.to_string(),
            p.code,
            p.is_active,
            p.notes,
            p.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_participant_by_code(
    conn: &Connection,
    code: &str,
) -> Result<Option<Participant>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, code, is_active, notes, created_at FROM participants WHERE code = ?1",
        params![code],
        participant_from_row,
    );

    match result {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Resolve a participant code to its id, considering active participants only.
pub fn get_active_participant_by_code(
    conn: &Connection,
    code: &str,
) -> Result<Option<Participant>, DatabaseError> {
    Ok(get_participant_by_code(conn, code)?.filter(|p| p.is_active))
}

pub fn list_participants(
    conn: &Connection,
    include_inactive: bool,
) -> Result<Vec<Participant>, DatabaseError> {
    let sql = if include_inactive {
        "SELECT id, code, is_active, notes, created_at FROM participants ORDER BY created_at ASC"
    } else {
        "SELECT id, code, is_active, notes, created_at FROM participants
         WHERE is_active = 1 ORDER BY created_at ASC"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], participant_from_row)?;

    let mut participants = Vec::new();
    for row in rows {
        participants.push(row?);
    }
    Ok(participants)
}

pub fn set_participant_active(
    conn: &Connection,
    id: &Uuid,
    is_active: bool,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE participants SET is_active = ?1 WHERE id = ?2",
        params![is_active, id.to_string()],
    )?;
    Ok(())
}

pub fn set_participant_notes(
    conn: &Connection,
    id: &Uuid,
    notes: Option<&str>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE participants SET notes = ?1 WHERE id = ?2",
        params![notes, id.to_string()],
    )?;
    Ok(())
}

pub fn count_participants(conn: &Connection, active_only: bool) -> Result<u64, DatabaseError> {
    let sql = if active_only {
        "SELECT COUNT(*) FROM participants WHERE is_active = 1"
    } else {
        "SELECT COUNT(*) FROM participants"
    };
    let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(count as u64)
}

fn participant_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        code: row.get(1)?,
        is_active: row.get(2)?,
        notes: row.get(3)?,
        created_at: row.get::<_, NaiveDateTime>(4)?,
    })
}

pub(super) fn parse_uuid(s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}
