//! History Assembler — turns the persisted message log into a bounded,
//! ordered prompt context for a model call.
//!
//! Pure read path: no side effects, no state between calls. An unknown
//! participant yields an empty sequence, not an error — there is simply
//! nothing to assemble yet.

use rusqlite::Connection;

use crate::db::{repository, DatabaseError};
use crate::gateway::ChatMessage;
use crate::models::enums::TurnRole;
use crate::models::ConversationTurn;
use crate::prompts;

/// Hard cap on a single history request, bounding payload and cost.
pub const MAX_HISTORY_LIMIT: u32 = 500;

/// Window used when assembling model context for a chat reply.
pub const DEFAULT_CONTEXT_LIMIT: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("History limit {requested} exceeds the maximum of {max}")]
    LimitTooLarge { requested: u32, max: u32 },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Ordered slice of a participant's turns plus the total available count
/// (for pagination).
pub fn assemble_history(
    conn: &Connection,
    participant_code: &str,
    conversation_key: Option<&str>,
    limit: u32,
    offset: u32,
) -> Result<(Vec<ConversationTurn>, u64), HistoryError> {
    if limit > MAX_HISTORY_LIMIT {
        return Err(HistoryError::LimitTooLarge { requested: limit, max: MAX_HISTORY_LIMIT });
    }

    let Some(participant) = repository::get_participant_by_code(conn, participant_code)? else {
        return Ok((Vec::new(), 0));
    };

    let turns =
        repository::turns_for_participant(conn, &participant.id, conversation_key, limit, offset)?;
    let total = repository::count_turns_for_participant(conn, &participant.id, conversation_key)?;
    Ok((turns, total))
}

/// Distinct conversation keys for a participant, most recently active first.
pub fn recent_conversations(
    conn: &Connection,
    participant_code: &str,
    limit: u32,
) -> Result<Vec<String>, DatabaseError> {
    let Some(participant) = repository::get_participant_by_code(conn, participant_code)? else {
        return Ok(Vec::new());
    };
    repository::recent_conversation_keys(conn, &participant.id, limit)
}

/// External conversation ids already merged for a participant.
pub fn external_conversations(
    conn: &Connection,
    participant_code: &str,
) -> Result<Vec<String>, DatabaseError> {
    let Some(participant) = repository::get_participant_by_code(conn, participant_code)? else {
        return Ok(Vec::new());
    };
    repository::external_conversation_ids(conn, &participant.id)
}

/// Build the model prompt from assembled turns.
///
/// Exactly one system entry, always first, carrying the fixed behavioral
/// directive. Only `user` and `assistant` turns are forwarded — any stray
/// `system` rows in storage are dropped so the directive appears once.
pub fn build_prompt(turns: &[ConversationTurn]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    messages.push(ChatMessage::system(prompts::MASTER_PROMPT));

    for turn in turns {
        match turn.role {
            TurnRole::User => messages.push(ChatMessage::user(turn.content.clone())),
            TurnRole::Assistant => messages.push(ChatMessage::assistant(turn.content.clone())),
            TurnRole::System => {}
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{insert_participant, insert_turn};
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::Provenance;
    use crate::models::Participant;
    use chrono::{NaiveDate, NaiveDateTime, Utc};
    use uuid::Uuid;

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

    fn ts(m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, 1)
            .unwrap()
            .and_hms_opt(14, m, 0)
            .unwrap()
    }

    fn add_turn(conn: &Connection, pid: Uuid, key: &str, role: TurnRole, content: &str, m: u32) {
        insert_turn(
            conn,
            &ConversationTurn {
                id: Uuid::new_v4(),
                participant_id: pid,
                conversation_key: key.to_string(),
                role,
                content: content.to_string(),
                timestamp: ts(m),
                model_used: None,
                audio_ref: None,
                provenance: Provenance::Internal,
                external_conversation_id: None,
                external_message_id: None,
            },
        )
        .unwrap();
    }

    #[test]
    fn unknown_participant_yields_empty_not_error() {
        let conn = open_memory_database().unwrap();
        let (turns, total) = assemble_history(&conn, "RID404", None, 50, 0).unwrap();
        assert!(turns.is_empty());
        assert_eq!(total, 0);
        assert!(recent_conversations(&conn, "RID404", 10).unwrap().is_empty());
        assert!(external_conversations(&conn, "RID404").unwrap().is_empty());
    }

    #[test]
    fn limit_above_cap_rejected_before_any_query() {
        let (conn, _) = setup();
        let err = assemble_history(&conn, "RID001", None, 501, 0).unwrap_err();
        assert!(matches!(err, HistoryError::LimitTooLarge { requested: 501, .. }));
        // The cap itself is allowed.
        assert!(assemble_history(&conn, "RID001", None, 500, 0).is_ok());
    }

    #[test]
    fn out_of_order_inserts_come_back_chronological() {
        let (conn, pid) = setup();
        add_turn(&conn, pid, "c1", TurnRole::Assistant, "second", 2);
        add_turn(&conn, pid, "c1", TurnRole::User, "first", 1);
        add_turn(&conn, pid, "c1", TurnRole::User, "third", 3);

        let (turns, total) = assemble_history(&conn, "RID001", Some("c1"), 50, 0).unwrap();
        assert_eq!(total, 3);
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
        assert!(turns.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn conversation_filter_vs_all_conversations() {
        let (conn, pid) = setup();
        add_turn(&conn, pid, "c1", TurnRole::User, "in c1", 1);
        add_turn(&conn, pid, "c2", TurnRole::User, "in c2", 2);

        let (scoped, total) = assemble_history(&conn, "RID001", Some("c1"), 50, 0).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(total, 1);

        let (all, total) = assemble_history(&conn, "RID001", None, 50, 0).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(total, 2);
    }

    #[test]
    fn pagination_total_reflects_full_count() {
        let (conn, pid) = setup();
        for m in 0..10 {
            add_turn(&conn, pid, "c1", TurnRole::User, &format!("m{m}"), m);
        }
        let (page, total) = assemble_history(&conn, "RID001", Some("c1"), 3, 6).unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(total, 10);
        assert_eq!(page[0].content, "m6");
    }

    #[test]
    fn prompt_has_directive_first_and_exactly_once() {
        let (conn, pid) = setup();
        add_turn(&conn, pid, "c1", TurnRole::User, "What is P.A.D.?", 1);
        // A stray system row in storage must not be forwarded.
        add_turn(&conn, pid, "c1", TurnRole::System, "stale directive", 2);
        add_turn(&conn, pid, "c1", TurnRole::Assistant, "A circulation condition.", 3);

        let (turns, _) = assemble_history(&conn, "RID001", Some("c1"), 50, 0).unwrap();
        let prompt = build_prompt(&turns);

        assert_eq!(prompt[0].role, "system");
        assert_eq!(prompt[0].content, prompts::MASTER_PROMPT);
        assert_eq!(prompt.iter().filter(|m| m.role == "system").count(), 1);
        assert_eq!(prompt.len(), 3);
        assert_eq!(prompt[1].role, "user");
        assert_eq!(prompt[2].role, "assistant");
    }

    #[test]
    fn empty_conversation_prompt_is_directive_only() {
        let (conn, _) = setup();
        let (turns, total) = assemble_history(&conn, "RID001", Some("new-conv"), 50, 0).unwrap();
        assert_eq!(total, 0);

        let prompt = build_prompt(&turns);
        assert_eq!(prompt.len(), 1);
        assert_eq!(prompt[0].role, "system");
    }

    #[test]
    fn recent_conversations_most_recent_first() {
        let (conn, pid) = setup();
        add_turn(&conn, pid, "older", TurnRole::User, "a", 1);
        add_turn(&conn, pid, "newer", TurnRole::User, "b", 5);
        add_turn(&conn, pid, "older", TurnRole::Assistant, "c", 2);

        let keys = recent_conversations(&conn, "RID001", 10).unwrap();
        assert_eq!(keys, vec!["newer".to_string(), "older".to_string()]);
    }
}
