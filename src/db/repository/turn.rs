use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, ToSql};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{Provenance, TurnRole};
use crate::models::ConversationTurn;

use super::participant::parse_uuid;

const TURN_COLUMNS: &str = "id, participant_id, conversation_key, role, content, timestamp,
     model_used, audio_ref, provenance, external_conversation_id, external_message_id";

pub fn insert_turn(conn: &Connection, turn: &ConversationTurn) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO conversation_turns
         (id, participant_id, conversation_key, role, content, timestamp,
          model_used, audio_ref, provenance, external_conversation_id, external_message_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            turn.id.to_string(),
            turn.participant_id.to_string(),
            turn.conversation_key,
            turn.role.as_str(),
            turn.content,
            turn.timestamp,
            turn.model_used,
            turn.audio_ref,
            turn.provenance.as_str(),
            turn.external_conversation_id,
            turn.external_message_id,
        ],
    )?;
    Ok(())
}

/// Look up a turn by its externally-assigned identity pair.
///
/// This is the merge idempotence check; the unique index on the same pair is
/// the backstop for concurrent writers.
pub fn find_external_turn(
    conn: &Connection,
    external_conversation_id: &str,
    external_message_id: &str,
) -> Result<Option<(Uuid, NaiveDateTime)>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, timestamp FROM conversation_turns
         WHERE external_conversation_id = ?1 AND external_message_id = ?2",
        params![external_conversation_id, external_message_id],
        |row| {
            Ok((
                parse_uuid(&row.get::<_, String>(0)?)?,
                row.get::<_, NaiveDateTime>(1)?,
            ))
        },
    );

    match result {
        Ok(found) => Ok(Some(found)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Turns for one participant, oldest first, with insertion order as the
/// tie-break for equal timestamps. `conversation_key = None` spans all of the
/// participant's conversations.
pub fn turns_for_participant(
    conn: &Connection,
    participant_id: &Uuid,
    conversation_key: Option<&str>,
    limit: u32,
    offset: u32,
) -> Result<Vec<ConversationTurn>, DatabaseError> {
    let pid = participant_id.to_string();
    let mut sql = format!(
        "SELECT {TURN_COLUMNS} FROM conversation_turns WHERE participant_id = ?"
    );
    let mut binds: Vec<&dyn ToSql> = vec![&pid];
    if let Some(key) = conversation_key.as_ref() {
        sql.push_str(" AND conversation_key = ?");
        binds.push(key);
    }
    sql.push_str(" ORDER BY timestamp ASC, rowid ASC LIMIT ? OFFSET ?");
    let limit = limit as i64;
    let offset = offset as i64;
    binds.push(&limit);
    binds.push(&offset);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(binds), turn_from_row)?;

    let mut turns = Vec::new();
    for row in rows {
        turns.push(row?);
    }
    Ok(turns)
}

/// Total turn count behind `turns_for_participant`, for pagination.
pub fn count_turns_for_participant(
    conn: &Connection,
    participant_id: &Uuid,
    conversation_key: Option<&str>,
) -> Result<u64, DatabaseError> {
    let count: i64 = match conversation_key {
        Some(key) => conn.query_row(
            "SELECT COUNT(*) FROM conversation_turns
             WHERE participant_id = ?1 AND conversation_key = ?2",
            params![participant_id.to_string(), key],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COUNT(*) FROM conversation_turns WHERE participant_id = ?1",
            params![participant_id.to_string()],
            |row| row.get(0),
        )?,
    };
    Ok(count as u64)
}

/// Distinct conversation keys for a participant, most recently active first.
pub fn recent_conversation_keys(
    conn: &Connection,
    participant_id: &Uuid,
    limit: u32,
) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT conversation_key FROM conversation_turns
         WHERE participant_id = ?1
         GROUP BY conversation_key
         ORDER BY MAX(timestamp) DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(
        params![participant_id.to_string(), limit as i64],
        |row| row.get::<_, String>(0),
    )?;

    let mut keys = Vec::new();
    for row in rows {
        keys.push(row?);
    }
    Ok(keys)
}

/// Distinct external conversation ids already merged for a participant.
pub fn external_conversation_ids(
    conn: &Connection,
    participant_id: &Uuid,
) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT external_conversation_id FROM conversation_turns
         WHERE participant_id = ?1 AND external_conversation_id IS NOT NULL",
    )?;
    let rows = stmt.query_map(params![participant_id.to_string()], |row| {
        row.get::<_, String>(0)
    })?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

/// All turns for a participant within the half-open window `[start, end)`,
/// chronological. Either bound may be absent.
pub fn turns_in_window(
    conn: &Connection,
    participant_id: &Uuid,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> Result<Vec<ConversationTurn>, DatabaseError> {
    let pid = participant_id.to_string();
    let mut sql = format!(
        "SELECT {TURN_COLUMNS} FROM conversation_turns WHERE participant_id = ?"
    );
    let mut binds: Vec<&dyn ToSql> = vec![&pid];
    if let Some(start) = start.as_ref() {
        sql.push_str(" AND timestamp >= ?");
        binds.push(start);
    }
    if let Some(end) = end.as_ref() {
        sql.push_str(" AND timestamp < ?");
        binds.push(end);
    }
    sql.push_str(" ORDER BY timestamp ASC, rowid ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(binds), turn_from_row)?;

    let mut turns = Vec::new();
    for row in rows {
        turns.push(row?);
    }
    Ok(turns)
}

pub fn count_turns(conn: &Connection) -> Result<u64, DatabaseError> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM conversation_turns", [], |row| row.get(0))?;
    Ok(count as u64)
}

pub fn count_turns_since(conn: &Connection, since: NaiveDateTime) -> Result<u64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM conversation_turns WHERE timestamp >= ?1",
        params![since],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

pub fn count_distinct_conversations(conn: &Connection) -> Result<u64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT conversation_key) FROM conversation_turns",
        [],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

pub fn last_activity_for(
    conn: &Connection,
    participant_id: &Uuid,
) -> Result<Option<NaiveDateTime>, DatabaseError> {
    let last: Option<NaiveDateTime> = conn.query_row(
        "SELECT MAX(timestamp) FROM conversation_turns WHERE participant_id = ?1",
        params![participant_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(last)
}

fn turn_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationTurn> {
    let role: String = row.get(3)?;
    let provenance: String = row.get(8)?;
    Ok(ConversationTurn {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        participant_id: parse_uuid(&row.get::<_, String>(1)?)?,
        conversation_key: row.get(2)?,
        role: TurnRole::from_str(&role).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?,
        content: row.get(4)?,
        timestamp: row.get::<_, NaiveDateTime>(5)?,
        model_used: row.get(6)?,
        audio_ref: row.get(7)?,
        provenance: Provenance::from_str(&provenance).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?,
        external_conversation_id: row.get(9)?,
        external_message_id: row.get(10)?,
    })
}
