//! Ingestion/Merge service — the single write path into the transcript store.
//!
//! Internally-authored turns and turns pulled from the external voice
//! vendor's conversation log both land here. Externally-sourced turns carry
//! a provider-assigned (conversation id, message id) pair which is the sole
//! deduplication key: the service checks it before inserting, and the
//! store's unique index is the backstop when two writers race.

use chrono::{DateTime, NaiveDateTime, Utc};
use futures_util::future::BoxFuture;
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::models::enums::{Provenance, TurnRole};
use crate::models::ConversationTurn;

/// Upper bound on a single turn's content.
pub const MAX_CONTENT_LEN: usize = 32_768;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Participant '{0}' not found")]
    ParticipantNotFound(String),

    #[error("Invalid message: {0}")]
    Validation(String),

    #[error("Transcript fetch failed (HTTP {status}): {body}")]
    TranscriptApi { status: u16, body: String },

    #[error("Transcript fetch failed: {0}")]
    Transport(String),

    /// A bulk sync is not atomic; a mid-way failure reports how many
    /// messages were already committed.
    #[error("Transcript sync aborted after {inserted} inserted messages: {reason}")]
    SyncAborted { inserted: usize, reason: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// A turn to ingest, before identity and conversation-key assignment.
#[derive(Debug, Clone)]
pub struct NewTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: NaiveDateTime,
    pub provenance: Provenance,
    pub conversation_key: Option<String>,
    pub model_used: Option<String>,
    pub audio_ref: Option<String>,
    pub external_conversation_id: Option<String>,
    pub external_message_id: Option<String>,
}

impl NewTurn {
    /// An internally-authored turn with no external identity.
    pub fn internal(role: TurnRole, content: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
            provenance: Provenance::Internal,
            conversation_key: None,
            model_used: None,
            audio_ref: None,
            external_conversation_id: None,
            external_message_id: None,
        }
    }
}

/// Result of one ingest call. `newly_inserted` is false when an equivalent
/// turn already existed; the id and timestamp are then the existing turn's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub turn_id: Uuid,
    pub timestamp: NaiveDateTime,
    pub conversation_key: String,
    pub newly_inserted: bool,
}

/// Result of one bulk transcript sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub inserted: usize,
    pub conversation_key: String,
}

/// Synthesize a conversation-grouping key from the current time and the
/// participant identity. Callers re-supply it on subsequent turns.
pub fn conversation_key_for(participant_code: &str, now: NaiveDateTime) -> String {
    format!("conv_{}_{participant_code}", now.format("%Y%m%d%H%M%S"))
}

/// Insert a single turn, or report that an equivalent turn already exists.
pub fn ingest_message(
    conn: &Connection,
    participant_code: &str,
    turn: NewTurn,
) -> Result<IngestOutcome, IngestError> {
    if turn.content.trim().is_empty() {
        return Err(IngestError::Validation("content is empty".to_string()));
    }
    if turn.content.len() > MAX_CONTENT_LEN {
        return Err(IngestError::Validation(format!(
            "content exceeds {MAX_CONTENT_LEN} bytes"
        )));
    }

    let participant = repository::get_participant_by_code(conn, participant_code)?
        .ok_or_else(|| IngestError::ParticipantNotFound(participant_code.to_string()))?;

    // Idempotence check — only when the full external identity is present.
    let external_identity = match (&turn.external_conversation_id, &turn.external_message_id) {
        (Some(conv), Some(msg)) => Some((conv.clone(), msg.clone())),
        _ => None,
    };
    if let Some((conv, msg)) = &external_identity {
        if let Some((existing_id, existing_ts)) = repository::find_external_turn(conn, conv, msg)? {
            return Ok(IngestOutcome {
                turn_id: existing_id,
                timestamp: existing_ts,
                conversation_key: conv.clone(),
                newly_inserted: false,
            });
        }
    }

    let conversation_key = turn
        .conversation_key
        .clone()
        .or_else(|| turn.external_conversation_id.clone())
        .unwrap_or_else(|| conversation_key_for(participant_code, Utc::now().naive_utc()));

    let record = ConversationTurn {
        id: Uuid::new_v4(),
        participant_id: participant.id,
        conversation_key: conversation_key.clone(),
        role: turn.role,
        content: turn.content,
        timestamp: turn.timestamp,
        model_used: turn.model_used,
        audio_ref: turn.audio_ref,
        provenance: turn.provenance,
        external_conversation_id: turn.external_conversation_id,
        external_message_id: turn.external_message_id,
    };

    match repository::insert_turn(conn, &record) {
        Ok(()) => Ok(IngestOutcome {
            turn_id: record.id,
            timestamp: record.timestamp,
            conversation_key,
            newly_inserted: true,
        }),
        // A concurrent writer won the check-then-insert race on the same
        // external identity; the unique index caught it. Return the winner.
        Err(e) if e.is_unique_violation() => {
            if let Some((conv, msg)) = &external_identity {
                if let Some((existing_id, existing_ts)) =
                    repository::find_external_turn(conn, conv, msg)?
                {
                    return Ok(IngestOutcome {
                        turn_id: existing_id,
                        timestamp: existing_ts,
                        conversation_key: conv.clone(),
                        newly_inserted: false,
                    });
                }
            }
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

// ──────────────────────────────────────────────
// Bulk transcript sync
// ──────────────────────────────────────────────

/// One message in a remote voice-conversation transcript. Field names vary
/// across vendor payloads; `message` and `text` are alternates.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl RemoteMessage {
    fn content(&self) -> &str {
        self.message
            .as_deref()
            .or(self.text.as_deref())
            .unwrap_or("")
    }

    fn role(&self) -> TurnRole {
        match self.role.as_deref() {
            Some("user") => TurnRole::User,
            _ => TurnRole::Assistant,
        }
    }
}

/// A remote conversation log as returned by the voice vendor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteTranscript {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub transcript: Vec<RemoteMessage>,
}

/// Fetches a full conversation transcript from the external voice vendor.
pub trait TranscriptFetcher: Send + Sync {
    fn fetch<'a>(
        &'a self,
        external_conversation_id: &'a str,
    ) -> BoxFuture<'a, Result<RemoteTranscript, IngestError>>;
}

/// Parse an ISO-8601 timestamp, tolerating a trailing `Z` or offset.
pub fn parse_external_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.naive_utc());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

/// Fetch a remote transcript and merge it into the store, one message at a
/// time. Empty messages are skipped; previously-merged messages are matched
/// by external identity and not duplicated. Not atomic: a failure partway
/// reports the count already committed.
pub async fn sync_external_transcript<F: TranscriptFetcher + ?Sized>(
    fetcher: &F,
    conn: &Connection,
    participant_code: &str,
    external_conversation_id: &str,
) -> Result<SyncOutcome, IngestError> {
    repository::get_participant_by_code(conn, participant_code)?
        .ok_or_else(|| IngestError::ParticipantNotFound(participant_code.to_string()))?;

    let remote = fetcher.fetch(external_conversation_id).await?;
    let conversation_key = remote
        .conversation_id
        .unwrap_or_else(|| external_conversation_id.to_string());

    let mut inserted = 0usize;
    for message in &remote.transcript {
        let content = message.content().trim();
        if content.is_empty() {
            continue;
        }
        let timestamp = message
            .timestamp
            .as_deref()
            .and_then(parse_external_timestamp)
            .unwrap_or_else(|| Utc::now().naive_utc());

        let turn = NewTurn {
            role: message.role(),
            content: content.to_string(),
            timestamp,
            provenance: Provenance::ExternalVoice,
            conversation_key: Some(conversation_key.clone()),
            model_used: None,
            audio_ref: None,
            external_conversation_id: Some(external_conversation_id.to_string()),
            external_message_id: message.id.clone(),
        };

        match ingest_message(conn, participant_code, turn) {
            Ok(outcome) => {
                if outcome.newly_inserted {
                    inserted += 1;
                }
            }
            Err(e) => {
                tracing::warn!(
                    conversation = %external_conversation_id,
                    inserted,
                    error = %e,
                    "transcript sync aborted mid-way"
                );
                return Err(IngestError::SyncAborted { inserted, reason: e.to_string() });
            }
        }
    }

    tracing::info!(
        conversation = %external_conversation_id,
        inserted,
        total = remote.transcript.len(),
        "transcript sync complete"
    );
    Ok(SyncOutcome { inserted, conversation_key })
}

// ──────────────────────────────────────────────
// HTTP transcript client
// ──────────────────────────────────────────────

/// HTTP client for the voice vendor's conversation API.
pub struct VoiceApiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl VoiceApiClient {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            timeout_secs,
        }
    }
}

impl TranscriptFetcher for VoiceApiClient {
    fn fetch<'a>(
        &'a self,
        external_conversation_id: &'a str,
    ) -> BoxFuture<'a, Result<RemoteTranscript, IngestError>> {
        Box::pin(async move {
            let url = format!(
                "{}/v1/convai/conversations/{external_conversation_id}",
                self.base_url
            );
            let response = self
                .client
                .get(&url)
                .header("xi-api-key", &self.api_key)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        IngestError::Transport(format!(
                            "request timed out after {}s",
                            self.timeout_secs
                        ))
                    } else {
                        IngestError::Transport(e.to_string())
                    }
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(IngestError::TranscriptApi { status: status.as_u16(), body });
            }

            response
                .json::<RemoteTranscript>()
                .await
                .map_err(|e| IngestError::Transport(e.to_string()))
        })
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{count_turns_for_participant, insert_participant};
    use crate::db::sqlite::open_memory_database;
    use crate::models::Participant;
    use chrono::NaiveDate;

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

    fn ts(s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 6, 2)
            .unwrap()
            .and_hms_opt(15, 0, s)
            .unwrap()
    }

    fn external_turn(content: &str, msg_id: &str, s: u32) -> NewTurn {
        NewTurn {
            role: TurnRole::User,
            content: content.to_string(),
            timestamp: ts(s),
            provenance: Provenance::ExternalVoice,
            conversation_key: None,
            model_used: None,
            audio_ref: None,
            external_conversation_id: Some("extconv1".to_string()),
            external_message_id: Some(msg_id.to_string()),
        }
    }

    #[test]
    fn internal_turns_always_insert() {
        let (conn, pid) = setup();
        let first = ingest_message(
            &conn,
            "RID001",
            NewTurn::internal(TurnRole::User, "hello", ts(1)),
        )
        .unwrap();
        let second = ingest_message(
            &conn,
            "RID001",
            NewTurn::internal(TurnRole::User, "hello", ts(1)),
        )
        .unwrap();

        assert!(first.newly_inserted);
        assert!(second.newly_inserted);
        assert_ne!(first.turn_id, second.turn_id);
        assert_eq!(count_turns_for_participant(&conn, &pid, None).unwrap(), 2);
    }

    #[test]
    fn same_external_identity_ingested_once() {
        let (conn, pid) = setup();
        let first = ingest_message(&conn, "RID001", external_turn("hi", "m1", 1)).unwrap();
        let second = ingest_message(&conn, "RID001", external_turn("hi again", "m1", 9)).unwrap();

        assert!(first.newly_inserted);
        assert!(!second.newly_inserted);
        // The second call reports the first call's identity and timestamp.
        assert_eq!(second.turn_id, first.turn_id);
        assert_eq!(second.timestamp, first.timestamp);
        assert_eq!(count_turns_for_participant(&conn, &pid, None).unwrap(), 1);
    }

    #[test]
    fn unknown_participant_rejected_before_insert() {
        let (conn, _) = setup();
        let err = ingest_message(
            &conn,
            "RID404",
            NewTurn::internal(TurnRole::User, "hello", ts(1)),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::ParticipantNotFound(_)));
    }

    #[test]
    fn empty_and_oversize_content_rejected() {
        let (conn, _) = setup();
        let err = ingest_message(
            &conn,
            "RID001",
            NewTurn::internal(TurnRole::User, "   ", ts(1)),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));

        let oversize = "x".repeat(MAX_CONTENT_LEN + 1);
        let err = ingest_message(
            &conn,
            "RID001",
            NewTurn::internal(TurnRole::User, oversize, ts(1)),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[test]
    fn conversation_key_synthesized_when_absent() {
        let (conn, _) = setup();
        let outcome = ingest_message(
            &conn,
            "RID001",
            NewTurn::internal(TurnRole::User, "hello", ts(1)),
        )
        .unwrap();
        assert!(outcome.conversation_key.starts_with("conv_"));
        assert!(outcome.conversation_key.ends_with("_RID001"));
    }

    #[test]
    fn external_conversation_id_becomes_key_when_none_supplied() {
        let (conn, _) = setup();
        let outcome = ingest_message(&conn, "RID001", external_turn("hi", "m1", 1)).unwrap();
        assert_eq!(outcome.conversation_key, "extconv1");
    }

    #[test]
    fn key_format_is_stable() {
        let key = conversation_key_for("RID001", ts(5));
        assert_eq!(key, "conv_20260602150005_RID001");
    }

    #[test]
    fn parse_timestamp_accepts_zulu_and_naive() {
        assert_eq!(
            parse_external_timestamp("2026-06-02T15:00:05Z"),
            Some(ts(5))
        );
        assert_eq!(
            parse_external_timestamp("2026-06-02T15:00:05+00:00"),
            Some(ts(5))
        );
        assert_eq!(
            parse_external_timestamp("2026-06-02T15:00:05.000"),
            Some(ts(5))
        );
        assert!(parse_external_timestamp("last tuesday").is_none());
    }

    // ── Bulk sync ───────────────────────────────────────

    struct MockFetcher {
        transcript: RemoteTranscript,
    }

    impl TranscriptFetcher for MockFetcher {
        fn fetch<'a>(
            &'a self,
            _id: &'a str,
        ) -> BoxFuture<'a, Result<RemoteTranscript, IngestError>> {
            Box::pin(async move { Ok(self.transcript.clone()) })
        }
    }

    struct FailingFetcher;

    impl TranscriptFetcher for FailingFetcher {
        fn fetch<'a>(
            &'a self,
            _id: &'a str,
        ) -> BoxFuture<'a, Result<RemoteTranscript, IngestError>> {
            Box::pin(async move {
                Err(IngestError::TranscriptApi { status: 404, body: "not found".to_string() })
            })
        }
    }

    fn remote(role: &str, content: &str, id: &str, s: u32) -> RemoteMessage {
        RemoteMessage {
            role: Some(role.to_string()),
            message: Some(content.to_string()),
            text: None,
            id: Some(id.to_string()),
            timestamp: Some(format!("2026-06-02T15:00:{s:02}Z")),
        }
    }

    #[tokio::test]
    async fn sync_skips_empty_and_duplicate_messages() {
        let (conn, pid) = setup();
        // Message 5's identity is already stored.
        ingest_message(&conn, "RID001", external_turn("already here", "m5", 0)).unwrap();

        let fetcher = MockFetcher {
            transcript: RemoteTranscript {
                conversation_id: Some("extconv1".to_string()),
                transcript: vec![
                    remote("user", "What is P.A.D.?", "m1", 1),
                    remote("agent", "A circulation condition.", "m2", 2),
                    remote("user", "   ", "m3", 3),
                    remote("agent", "Anything else?", "m4", 4),
                    remote("user", "duplicate", "m5", 5),
                ],
            },
        };

        let outcome = sync_external_transcript(&fetcher, &conn, "RID001", "extconv1")
            .await
            .unwrap();
        assert_eq!(outcome.inserted, 3);
        assert_eq!(outcome.conversation_key, "extconv1");
        // 1 pre-existing + 3 new
        assert_eq!(count_turns_for_participant(&conn, &pid, None).unwrap(), 4);
    }

    #[tokio::test]
    async fn sync_is_idempotent_across_runs() {
        let (conn, pid) = setup();
        let fetcher = MockFetcher {
            transcript: RemoteTranscript {
                conversation_id: Some("extconv1".to_string()),
                transcript: vec![
                    remote("user", "hello", "m1", 1),
                    remote("agent", "hi there", "m2", 2),
                ],
            },
        };

        let first = sync_external_transcript(&fetcher, &conn, "RID001", "extconv1")
            .await
            .unwrap();
        let second = sync_external_transcript(&fetcher, &conn, "RID001", "extconv1")
            .await
            .unwrap();

        assert_eq!(first.inserted, 2);
        assert_eq!(second.inserted, 0);
        assert_eq!(count_turns_for_participant(&conn, &pid, None).unwrap(), 2);
    }

    #[tokio::test]
    async fn sync_normalizes_non_user_roles_to_assistant() {
        let (conn, pid) = setup();
        let fetcher = MockFetcher {
            transcript: RemoteTranscript {
                conversation_id: None,
                transcript: vec![remote("agent", "hi", "m1", 1)],
            },
        };
        sync_external_transcript(&fetcher, &conn, "RID001", "extconv2")
            .await
            .unwrap();

        let turns =
            crate::db::repository::turns_for_participant(&conn, &pid, Some("extconv2"), 10, 0)
                .unwrap();
        assert_eq!(turns[0].role, TurnRole::Assistant);
        assert_eq!(turns[0].provenance, Provenance::ExternalVoice);
    }

    #[tokio::test]
    async fn sync_reads_text_field_when_message_absent() {
        let (conn, pid) = setup();
        let fetcher = MockFetcher {
            transcript: RemoteTranscript {
                conversation_id: None,
                transcript: vec![RemoteMessage {
                    role: Some("user".to_string()),
                    message: None,
                    text: Some("spoken words".to_string()),
                    id: Some("m1".to_string()),
                    timestamp: None,
                }],
            },
        };
        let outcome = sync_external_transcript(&fetcher, &conn, "RID001", "extconv3")
            .await
            .unwrap();
        assert_eq!(outcome.inserted, 1);

        let turns =
            crate::db::repository::turns_for_participant(&conn, &pid, Some("extconv3"), 10, 0)
                .unwrap();
        assert_eq!(turns[0].content, "spoken words");
    }

    #[tokio::test]
    async fn sync_propagates_fetch_failure() {
        let (conn, _) = setup();
        let err = sync_external_transcript(&FailingFetcher, &conn, "RID001", "extconv1")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::TranscriptApi { status: 404, .. }));
    }

    #[tokio::test]
    async fn sync_reports_partial_count_on_mid_way_failure() {
        let (conn, _) = setup();
        let fetcher = MockFetcher {
            transcript: RemoteTranscript {
                conversation_id: None,
                transcript: vec![
                    remote("user", "fine", "m1", 1),
                    remote("user", &"x".repeat(MAX_CONTENT_LEN + 1), "m2", 2),
                    remote("user", "never reached", "m3", 3),
                ],
            },
        };

        let err = sync_external_transcript(&fetcher, &conn, "RID001", "extconv1")
            .await
            .unwrap_err();
        match err {
            IngestError::SyncAborted { inserted, .. } => assert_eq!(inserted, 1),
            other => panic!("expected SyncAborted, got {other}"),
        }
    }

    #[tokio::test]
    async fn sync_unknown_participant_fails_before_fetch() {
        let (conn, _) = setup();
        let err = sync_external_transcript(&FailingFetcher, &conn, "RID404", "extconv1")
            .await
            .unwrap_err();
        // Participant check runs first — the failing fetcher is never reached.
        assert!(matches!(err, IngestError::ParticipantNotFound(_)));
    }

    #[test]
    fn remote_transcript_deserializes_vendor_payload() {
        let json = r#"{
            "conversation_id": "conv_abc",
            "status": "done",
            "transcript": [
                {"role": "user", "message": "Hello", "id": "m1", "timestamp": "2026-06-02T15:00:01Z"},
                {"role": "agent", "text": "Hi!", "id": "m2"}
            ]
        }"#;
        let parsed: RemoteTranscript = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.conversation_id.as_deref(), Some("conv_abc"));
        assert_eq!(parsed.transcript.len(), 2);
        assert_eq!(parsed.transcript[1].content(), "Hi!");
    }
}
