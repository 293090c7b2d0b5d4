use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Provenance, TurnRole};

/// One message in a conversation. Append-only; never updated or deleted.
///
/// The (external_conversation_id, external_message_id) pair, when both are
/// present, is the sole deduplication key for externally-sourced turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub participant_id: Uuid,
    pub conversation_key: String,
    pub role: TurnRole,
    pub content: String,
    pub timestamp: NaiveDateTime,
    pub model_used: Option<String>,
    pub audio_ref: Option<String>,
    pub provenance: Provenance,
    pub external_conversation_id: Option<String>,
    pub external_message_id: Option<String>,
}
