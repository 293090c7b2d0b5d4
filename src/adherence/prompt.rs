//! Prompt construction for the adherence-analysis pass.

use crate::models::ConversationTurn;

/// System message sent ahead of the analysis instruction.
pub const ANALYSIS_SYSTEM_PROMPT: &str =
    "You are a medical data analyst specializing in medication adherence analysis.";

/// Render stored turns as a flat chronological transcript, one line per
/// turn, tagged by role and timestamp.
pub fn render_transcript(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|turn| {
            format!(
                "[{}] {}: {}",
                turn.timestamp.format("%Y-%m-%d %H:%M:%S"),
                turn.role.as_str().to_uppercase(),
                turn.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the single analysis instruction embedding the rendered transcript.
///
/// The response contract is a fixed JSON schema; the parser tolerates
/// commentary around the object but the instruction asks for JSON only.
pub fn build_analysis_prompt(transcript: &str) -> String {
    format!(
        r#"You are a medical data analyst tasked with extracting medication adherence information from patient conversations.

Analyze the following conversation transcript and extract structured information about:

1. **Medications**: List all medications mentioned (name, dosage if mentioned)
2. **Timing**: When the patient takes their medications (morning, evening, with meals, etc.)
3. **Side Effects**: Any adverse effects or symptoms the patient reports
4. **Adherence Difficulties**: Problems the patient has taking medications as prescribed (forgetting, cost, access, confusion, etc.)
5. **Adherence Strategies**: Methods the patient uses to remember/take medications (alarms, pill boxes, routines, etc.)
6. **Questions/Concerns**: Any questions or concerns the patient has expressed about their medications

**Conversation Transcript:**
{transcript}

**Instructions:**
- Be specific and quote relevant parts of the conversation
- If information is not mentioned, state "Not discussed" for that category
- Use a confidence score (0-100) to indicate how certain you are about the information
- Provide a brief summary suitable for a medical provider to quickly understand the patient's adherence status

**Output Format (JSON):**
{{
  "medications": [
    {{"name": "medication name", "dosage": "dosage if mentioned", "mentioned_by_patient": true/false}}
  ],
  "timing_schedule": {{
    "morning": ["list of medications"],
    "afternoon": ["list of medications"],
    "evening": ["list of medications"],
    "as_needed": ["list of medications"],
    "unclear": ["list of medications"]
  }},
  "side_effects": [
    {{"medication": "medication name or 'unclear'", "effect": "description", "severity": "mild/moderate/severe"}}
  ],
  "adherence_difficulties": [
    {{"type": "forgetting/cost/access/side_effects/complexity/other", "description": "detailed description"}}
  ],
  "adherence_strategies": [
    {{"type": "alarm/pill_box/routine/caregiver_help/other", "description": "detailed description", "effectiveness": "working well/somewhat helpful/not working"}}
  ],
  "questions_concerns": [
    {{"topic": "topic area", "question": "patient's question or concern", "addressed": true/false}}
  ],
  "overall_adherence": {{
    "taking_medications": true/false/unclear,
    "taking_as_prescribed": true/false/unclear,
    "taking_correct_medications": true/false/unclear
  }},
  "confidence_score": 0-100,
  "summary": "Brief 2-3 sentence summary for medical provider",
  "key_concerns": ["List of 3-5 most important concerns for provider to know"],
  "recommendations": ["Suggested follow-up actions based on the conversation"]
}}

Respond ONLY with valid JSON, no additional text."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{Provenance, TurnRole};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn turn(role: TurnRole, content: &str, minute: u32) -> ConversationTurn {
        ConversationTurn {
            id: Uuid::new_v4(),
            participant_id: Uuid::new_v4(),
            conversation_key: "c1".to_string(),
            role,
            content: content.to_string(),
            timestamp: NaiveDate::from_ymd_opt(2026, 6, 2)
                .unwrap()
                .and_hms_opt(9, minute, 0)
                .unwrap(),
            model_used: None,
            audio_ref: None,
            provenance: Provenance::Internal,
            external_conversation_id: None,
            external_message_id: None,
        }
    }

    #[test]
    fn transcript_lines_tagged_with_role_and_timestamp() {
        let turns = vec![
            turn(TurnRole::User, "I forgot my statin yesterday.", 0),
            turn(TurnRole::Assistant, "That happens; a routine can help.", 1),
        ];
        let rendered = render_transcript(&turns);
        assert!(rendered.starts_with("[2026-06-02 09:00:00] USER: I forgot my statin yesterday."));
        assert!(rendered.contains("[2026-06-02 09:01:00] ASSISTANT: That happens"));
        // One blank line between entries
        assert_eq!(rendered.matches("\n\n").count(), 1);
    }

    #[test]
    fn empty_turns_render_empty_transcript() {
        assert_eq!(render_transcript(&[]), "");
    }

    #[test]
    fn prompt_embeds_transcript_and_schema() {
        let prompt = build_analysis_prompt("[2026-06-02 09:00:00] USER: hello");
        assert!(prompt.contains("[2026-06-02 09:00:00] USER: hello"));
        for key in [
            "\"medications\"",
            "\"timing_schedule\"",
            "\"side_effects\"",
            "\"adherence_difficulties\"",
            "\"adherence_strategies\"",
            "\"questions_concerns\"",
            "\"overall_adherence\"",
            "\"confidence_score\"",
            "\"key_concerns\"",
            "\"recommendations\"",
        ] {
            assert!(prompt.contains(key), "prompt is missing {key}");
        }
        assert!(prompt.contains("Respond ONLY with valid JSON"));
    }
}
