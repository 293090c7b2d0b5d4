use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{DisclaimerAck, ParticipantSession};

use super::participant::parse_uuid;

pub fn insert_session(conn: &Connection, s: &ParticipantSession) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO participant_sessions
         (id, participant_id, token, created_at, last_active, ip_address, user_agent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            s.id.to_string(),
            s.participant_id.to_string(),
            s.token,
            s.created_at,
            s.last_active,
            s.ip_address,
            s.user_agent,
        ],
    )?;
    Ok(())
}

pub fn update_session_token(
    conn: &Connection,
    id: &Uuid,
    token: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE participant_sessions SET token = ?1 WHERE id = ?2",
        params![token, id.to_string()],
    )?;
    Ok(())
}

/// Refresh `last_active` — called on every authenticated access.
pub fn touch_session(
    conn: &Connection,
    id: &Uuid,
    now: NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE participant_sessions SET last_active = ?1 WHERE id = ?2",
        params![now, id.to_string()],
    )?;
    Ok(())
}

pub fn get_session(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<ParticipantSession>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, participant_id, token, created_at, last_active, ip_address, user_agent
         FROM participant_sessions WHERE id = ?1",
        params![id.to_string()],
        |row| {
            Ok(ParticipantSession {
                id: parse_uuid(&row.get::<_, String>(0)?)?,
                participant_id: parse_uuid(&row.get::<_, String>(1)?)?,
                token: row.get(2)?,
                created_at: row.get(3)?,
                last_active: row.get(4)?,
                ip_address: row.get(5)?,
                user_agent: row.get(6)?,
            })
        },
    );

    match result {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn count_sessions(conn: &Connection) -> Result<u64, DatabaseError> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM participant_sessions", [], |row| row.get(0))?;
    Ok(count as u64)
}

pub fn count_sessions_for(conn: &Connection, participant_id: &Uuid) -> Result<u64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM participant_sessions WHERE participant_id = ?1",
        params![participant_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

pub fn count_sessions_active_since(
    conn: &Connection,
    since: NaiveDateTime,
) -> Result<u64, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM participant_sessions WHERE last_active >= ?1",
        params![since],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

pub fn insert_disclaimer_ack(conn: &Connection, ack: &DisclaimerAck) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO disclaimer_acks
         (id, participant_id, acknowledged_at, ip_address, disclaimer_version)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            ack.id.to_string(),
            ack.participant_id.to_string(),
            ack.acknowledged_at,
            ack.ip_address,
            ack.disclaimer_version,
        ],
    )?;
    Ok(())
}

/// True when the participant has acknowledged the disclaimer at least once.
pub fn has_disclaimer_ack(conn: &Connection, participant_id: &Uuid) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM disclaimer_acks WHERE participant_id = ?1",
        params![participant_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::insert_participant;
    use crate::db::sqlite::open_memory_database;
    use crate::models::Participant;
    use chrono::{Duration, Utc};

    fn setup() -> (Connection, Uuid) {
        let conn = open_memory_database().unwrap();
        let p = Participant {
            id: Uuid::new_v4(),
            code: "RID001".to_string(),
            is_active: true,
            notes: None,
            created_at: Utc::now().naive_utc(),
        };
        insert_participant(&conn, &p).unwrap();
        (conn, p.id)
    }

    fn make_session(conn: &Connection, participant_id: Uuid) -> ParticipantSession {
        let now = Utc::now().naive_utc();
        let s = ParticipantSession {
            id: Uuid::new_v4(),
            participant_id,
            token: String::new(),
            created_at: now,
            last_active: now,
            ip_address: Some("10.0.0.5".to_string()),
            user_agent: Some("test-agent".to_string()),
        };
        insert_session(conn, &s).unwrap();
        s
    }

    #[test]
    fn insert_and_touch_session() {
        let (conn, pid) = setup();
        let s = make_session(&conn, pid);

        let later = s.last_active + Duration::minutes(5);
        touch_session(&conn, &s.id, later).unwrap();

        let fetched = get_session(&conn, &s.id).unwrap().unwrap();
        assert_eq!(fetched.last_active, later);
        assert_eq!(fetched.ip_address.as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn token_updated_after_issue() {
        let (conn, pid) = setup();
        let s = make_session(&conn, pid);
        update_session_token(&conn, &s.id, "bearer-abc").unwrap();

        let fetched = get_session(&conn, &s.id).unwrap().unwrap();
        assert_eq!(fetched.token, "bearer-abc");
    }

    #[test]
    fn many_sessions_per_participant_allowed() {
        let (conn, pid) = setup();
        make_session(&conn, pid);
        make_session(&conn, pid);
        make_session(&conn, pid);

        assert_eq!(count_sessions_for(&conn, &pid).unwrap(), 3);
        assert_eq!(count_sessions(&conn).unwrap(), 3);
    }

    #[test]
    fn active_since_counts_recent_only() {
        let (conn, pid) = setup();
        let s = make_session(&conn, pid);
        // Push this session's activity into the past
        let stale = Utc::now().naive_utc() - Duration::hours(48);
        touch_session(&conn, &s.id, stale).unwrap();
        make_session(&conn, pid);

        let cutoff = Utc::now().naive_utc() - Duration::hours(24);
        assert_eq!(count_sessions_active_since(&conn, cutoff).unwrap(), 1);
    }

    #[test]
    fn disclaimer_ack_gates() {
        let (conn, pid) = setup();
        assert!(!has_disclaimer_ack(&conn, &pid).unwrap());

        insert_disclaimer_ack(
            &conn,
            &DisclaimerAck {
                id: Uuid::new_v4(),
                participant_id: pid,
                acknowledged_at: Utc::now().naive_utc(),
                ip_address: None,
                disclaimer_version: "1.0".to_string(),
            },
        )
        .unwrap();
        assert!(has_disclaimer_ack(&conn, &pid).unwrap());

        // Acknowledging again is allowed — one row per acceptance event.
        insert_disclaimer_ack(
            &conn,
            &DisclaimerAck {
                id: Uuid::new_v4(),
                participant_id: pid,
                acknowledged_at: Utc::now().naive_utc(),
                ip_address: None,
                disclaimer_version: "1.0".to_string(),
            },
        )
        .unwrap();
        assert!(has_disclaimer_ack(&conn, &pid).unwrap());
    }
}
