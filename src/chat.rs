//! Chat service — orchestrates one conversational turn end to end.
//!
//! Write user turn → assemble bounded history → generate → best-effort
//! speech synthesis → write assistant turn. A generation failure surfaces to
//! the caller and persists no assistant turn; a speech failure is swallowed
//! and the reply persists with a null audio reference.

use std::path::Path;

use chrono::Utc;
use rusqlite::Connection;
use tokio::sync::mpsc;

use crate::db::{repository, DatabaseError};
use crate::gateway::{GatewayError, ModelGateway};
use crate::history::{self, HistoryError, DEFAULT_CONTEXT_LIMIT};
use crate::ingest::{self, IngestError, NewTurn};
use crate::models::enums::{Provenance, TurnRole};
use crate::models::ConversationTurn;
use crate::speech::{self, SpeechSynthesizer};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Participant '{0}' not found")]
    ParticipantNotFound(String),

    #[error("Authenticated participant does not match the request")]
    IdentityMismatch,

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Consumer disconnected before the reply completed")]
    Disconnected,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<HistoryError> for ChatError {
    fn from(err: HistoryError) -> Self {
        match err {
            HistoryError::LimitTooLarge { .. } => ChatError::Validation(err.to_string()),
            HistoryError::Database(e) => ChatError::Database(e),
        }
    }
}

impl From<IngestError> for ChatError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::ParticipantNotFound(code) => ChatError::ParticipantNotFound(code),
            IngestError::Validation(detail) => ChatError::Validation(detail),
            IngestError::Database(e) => ChatError::Database(e),
            other => ChatError::Validation(other.to_string()),
        }
    }
}

/// One inbound chat turn.
#[derive(Debug, Clone)]
pub struct ChatTurnRequest {
    pub participant_code: String,
    /// Absent on the first turn of a conversation; the reply carries the
    /// assigned key, which callers re-supply on subsequent turns.
    pub conversation_key: Option<String>,
    pub model: String,
    pub content: String,
}

/// The authenticated identity must match the identity named in the payload.
/// Never auto-corrected.
pub fn ensure_identity(authenticated_code: &str, requested_code: &str) -> Result<(), ChatError> {
    if authenticated_code != requested_code {
        tracing::warn!(
            authenticated = %authenticated_code,
            requested = %requested_code,
            "participant identity mismatch"
        );
        return Err(ChatError::IdentityMismatch);
    }
    Ok(())
}

/// Handle one turn on the synchronous request/response path.
pub async fn respond(
    conn: &Connection,
    gateway: &ModelGateway,
    synthesizer: Option<&dyn SpeechSynthesizer>,
    audio_dir: &Path,
    request: ChatTurnRequest,
) -> Result<ConversationTurn, ChatError> {
    let (prompt, conversation_key, participant_id) = persist_and_assemble(conn, &request)?;

    let reply_text = gateway.generate(&request.model, &prompt).await?;

    let audio_ref = speech::synthesize_or_skip(synthesizer, audio_dir, &reply_text).await;
    persist_reply(conn, &request, participant_id, conversation_key, reply_text, audio_ref)
}

/// Handle one turn on the streaming/duplex path. Fragments are forwarded on
/// `fragment_tx` as they arrive; the assistant turn is persisted only after
/// the stream completes, so a partial concatenation is never saved as a
/// finished answer.
pub async fn respond_streaming(
    conn: &Connection,
    gateway: &ModelGateway,
    synthesizer: Option<&dyn SpeechSynthesizer>,
    audio_dir: &Path,
    request: ChatTurnRequest,
    fragment_tx: mpsc::Sender<String>,
) -> Result<ConversationTurn, ChatError> {
    let (prompt, conversation_key, participant_id) = persist_and_assemble(conn, &request)?;

    let mut stream = gateway.generate_stream(&request.model, &prompt).await?;
    let mut full_response = String::new();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        full_response.push_str(&fragment);
        if fragment_tx.send(fragment).await.is_err() {
            // Receiver gone; dropping the stream cancels upstream work.
            return Err(ChatError::Disconnected);
        }
    }

    let audio_ref = speech::synthesize_or_skip(synthesizer, audio_dir, &full_response).await;
    persist_reply(conn, &request, participant_id, conversation_key, full_response, audio_ref)
}

/// Shared front half: save the user turn, then assemble bounded context for
/// the model call.
fn persist_and_assemble(
    conn: &Connection,
    request: &ChatTurnRequest,
) -> Result<(Vec<crate::gateway::ChatMessage>, String, Uuid), ChatError> {
    let participant = repository::get_participant_by_code(conn, &request.participant_code)?
        .ok_or_else(|| ChatError::ParticipantNotFound(request.participant_code.clone()))?;

    let mut user_turn = NewTurn::internal(
        TurnRole::User,
        request.content.clone(),
        Utc::now().naive_utc(),
    );
    user_turn.conversation_key = request.conversation_key.clone();
    let outcome = ingest::ingest_message(conn, &request.participant_code, user_turn)?;
    let conversation_key = outcome.conversation_key;

    let (turns, total) = history::assemble_history(
        conn,
        &request.participant_code,
        Some(&conversation_key),
        DEFAULT_CONTEXT_LIMIT,
        0,
    )?;
    tracing::debug!(
        participant = %request.participant_code,
        conversation = %conversation_key,
        context_turns = turns.len(),
        total,
        "assembled chat context"
    );

    Ok((history::build_prompt(&turns), conversation_key, participant.id))
}

fn persist_reply(
    conn: &Connection,
    request: &ChatTurnRequest,
    participant_id: Uuid,
    conversation_key: String,
    reply_text: String,
    audio_ref: Option<String>,
) -> Result<ConversationTurn, ChatError> {
    let mut reply = NewTurn::internal(
        TurnRole::Assistant,
        reply_text.clone(),
        Utc::now().naive_utc(),
    );
    reply.conversation_key = Some(conversation_key.clone());
    reply.model_used = Some(request.model.clone());
    reply.audio_ref = audio_ref.clone();
    let outcome = ingest::ingest_message(conn, &request.participant_code, reply)?;

    Ok(ConversationTurn {
        id: outcome.turn_id,
        participant_id,
        conversation_key,
        role: TurnRole::Assistant,
        content: reply_text,
        timestamp: outcome.timestamp,
        model_used: Some(request.model.clone()),
        audio_ref,
        provenance: Provenance::Internal,
        external_conversation_id: None,
        external_message_id: None,
    })
}
