//! Login gating and session lifecycle.
//!
//! Credential mechanics are an external collaborator: the `CredentialIssuer`
//! trait mints a bearer token for {participant identity, session id} and the
//! rest of the system trusts a verified token's identity. What lives here is
//! the store side — disclaimer gating, session rows, last-active tracking.

use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::models::{DisclaimerAck, ParticipantSession};

pub const DISCLAIMER_VERSION: &str = "1.0";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Participant '{0}' not found or inactive")]
    NotFound(String),

    #[error("Disclaimer must be acknowledged before login")]
    DisclaimerRequired,

    #[error("Credential issuance failed: {0}")]
    Credential(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Mints bearer credentials. Opaque to this crate.
pub trait CredentialIssuer: Send + Sync {
    fn issue(&self, participant_code: &str, session_id: &Uuid) -> Result<IssuedToken, AuthError>;
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: NaiveDateTime,
}

/// A session created at login, with its credential.
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub session: ParticipantSession,
    pub token: String,
    pub expires_at: NaiveDateTime,
}

/// Is this code an active participant?
pub fn validate_code(conn: &Connection, code: &str) -> Result<bool, DatabaseError> {
    Ok(repository::get_active_participant_by_code(conn, code)?.is_some())
}

/// Record one disclaimer acceptance event. A participant may acknowledge
/// more than once; every acceptance is kept.
pub fn acknowledge_disclaimer(
    conn: &Connection,
    code: &str,
    ip_address: Option<&str>,
) -> Result<DisclaimerAck, AuthError> {
    let participant = repository::get_active_participant_by_code(conn, code)?
        .ok_or_else(|| AuthError::NotFound(code.to_string()))?;

    let ack = DisclaimerAck {
        id: Uuid::new_v4(),
        participant_id: participant.id,
        acknowledged_at: Utc::now().naive_utc(),
        ip_address: ip_address.map(|s| s.to_string()),
        disclaimer_version: DISCLAIMER_VERSION.to_string(),
    };
    repository::insert_disclaimer_ack(conn, &ack)?;
    tracing::info!(participant = %code, "disclaimer acknowledged");
    Ok(ack)
}

/// Create a session and mint its credential.
///
/// Requires an active participant with at least one disclaimer
/// acknowledgment. Many sessions may coexist per participant.
pub fn login(
    conn: &Connection,
    issuer: &dyn CredentialIssuer,
    code: &str,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> Result<LoginSession, AuthError> {
    let participant = repository::get_active_participant_by_code(conn, code)?
        .ok_or_else(|| AuthError::NotFound(code.to_string()))?;

    if !repository::has_disclaimer_ack(conn, &participant.id)? {
        return Err(AuthError::DisclaimerRequired);
    }

    let now = Utc::now().naive_utc();
    let mut session = ParticipantSession {
        id: Uuid::new_v4(),
        participant_id: participant.id,
        token: String::new(),
        created_at: now,
        last_active: now,
        ip_address: ip_address.map(|s| s.to_string()),
        user_agent: user_agent.map(|s| s.to_string()),
    };
    repository::insert_session(conn, &session)?;

    let issued = issuer.issue(code, &session.id)?;
    repository::update_session_token(conn, &session.id, &issued.token)?;
    session.token = issued.token.clone();

    tracing::info!(participant = %code, session = %session.id, "session created");
    Ok(LoginSession {
        session,
        token: issued.token,
        expires_at: issued.expires_at,
    })
}

/// Refresh a session's last-active timestamp on authenticated access.
pub fn touch(conn: &Connection, session_id: &Uuid) -> Result<(), DatabaseError> {
    repository::touch_session(conn, session_id, Utc::now().naive_utc())
}
