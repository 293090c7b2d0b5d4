use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A research-study subject identified by an opaque code.
///
/// Identity is immutable once created; deactivation is a soft flag,
/// never a row deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub code: String,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

/// One bearer-credential session for a participant.
///
/// Many sessions may coexist per participant; `last_active` is touched on
/// every authenticated access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantSession {
    pub id: Uuid,
    pub participant_id: Uuid,
    pub token: String,
    pub created_at: NaiveDateTime,
    pub last_active: NaiveDateTime,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// One disclaimer-acceptance event. A participant may acknowledge more than
/// once; zero acknowledgments blocks login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisclaimerAck {
    pub id: Uuid,
    pub participant_id: Uuid,
    pub acknowledged_at: NaiveDateTime,
    pub ip_address: Option<String>,
    pub disclaimer_version: String,
}
