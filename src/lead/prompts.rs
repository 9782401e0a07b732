//! System prompt, extraction prompt and response parsing for lead intake.

use serde_json::Value;

use super::extract::{ExtractionResult, FieldCandidate};
use super::model::{ConversationTurn, LeadField, LeadRecord, Speaker};
use super::state::{FieldRejection, LeadTracker};

/// Reply used when the model's output could not be parsed.
pub const CLARIFICATION_REPLY: &str =
    "Sorry, I didn't quite catch that. Could you say it again, maybe in a bit more detail?";

/// Build the system prompt that drives the collection conversation.
pub fn lead_system_prompt() -> String {
    "\
You are a friendly sales assistant collecting details for a new CRM lead.

You need four things from the user:
- Name
- Email
- Phone
- Requirement (what they need from us)

Guidelines:
- Be concise: 1-3 sentences per reply. Ask for ONE missing detail at a time.
- Acknowledge what the user shares before asking for the next missing detail.
- Never invent values. Only report what the user actually stated.
- If a previous value was rejected, explain briefly why and ask again for that field.
- When every field is known, summarise the details and ask the user to confirm."
        .to_string()
}

/// Render the last `window` turns as `User:`/`Assistant:` lines.
pub fn render_history(history: &[ConversationTurn], window: usize) -> String {
    let start = history.len().saturating_sub(window);
    history[start..]
        .iter()
        .map(|turn| {
            let who = match turn.speaker {
                Speaker::User => "User",
                Speaker::Assistant => "Assistant",
            };
            format!("{}: {}", who, turn.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the per-turn extraction prompt.
pub fn extraction_prompt(conversation_text: &str, tracker: &LeadTracker) -> String {
    let missing = tracker
        .missing_fields()
        .iter()
        .map(|f| f.key())
        .collect::<Vec<_>>();
    let missing = if missing.is_empty() {
        "none".to_string()
    } else {
        missing.join(", ")
    };

    let rejections: Vec<String> = tracker
        .rejections()
        .map(|r| format!("- {}: {}", r.field.key(), r.reason))
        .collect();
    let rejection_section = if rejections.is_empty() {
        String::new()
    } else {
        format!("\n\nRejected values (ask again for these):\n{}", rejections.join("\n"))
    };

    format!(
        "Conversation so far:\n\n\
         {conversation_text}\n\n\
         {record}\n\n\
         Missing fields: {missing}{rejection_section}\n\n\
         From the LATEST user message only, extract any lead fields the user stated \
         (including corrections to earlier values). Use null for anything not stated.\n\
         Then write the next assistant reply continuing the conversation.\n\n\
         Respond with ONLY this JSON, no explanation or markdown formatting:\n\
         {{\n  \
           \"fields\": {{\n    \
             \"name\": {{\"value\": \"string\", \"confidence\": 0.0-1.0}} or null,\n    \
             \"email\": {{\"value\": \"string\", \"confidence\": 0.0-1.0}} or null,\n    \
             \"phone\": {{\"value\": \"string\", \"confidence\": 0.0-1.0}} or null,\n    \
             \"requirement\": {{\"value\": \"string\", \"confidence\": 0.0-1.0}} or null\n  \
           }},\n  \
           \"reply\": \"next assistant message\"\n\
         }}\n\
         Use confidence 1.0 when the user stated the value explicitly.",
        record = tracker.record().to_prompt_section(),
    )
}

/// Parse the model output into an `ExtractionResult`.
///
/// Accepts `{"fields": {...}, "reply": ...}` as well as a flat object of
/// field keys. A parsed payload without a reply carries an empty reply.
pub fn parse_extraction_response(raw: &str) -> ExtractionResult {
    let unparsed = || ExtractionResult::Unparsed {
        raw: raw.to_string(),
        reply: CLARIFICATION_REPLY.to_string(),
    };

    let Some(json) = extract_json_object(raw) else {
        tracing::warn!(response = raw, "No JSON object in extraction response");
        return unparsed();
    };

    let payload: Value = match serde_json::from_str(json) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(_) => return unparsed(),
        Err(e) => {
            tracing::warn!(error = %e, response = raw, "Failed to parse extraction JSON");
            return unparsed();
        }
    };

    let reply = payload
        .get("reply")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string());

    let fields = match payload.get("fields") {
        Some(Value::Object(map)) => Some(map),
        Some(Value::Null) | None => None,
        Some(_) => return unparsed(),
    };

    let source = match fields {
        Some(map) => map,
        // Flat legacy shape: {"name": ..., "email": ..., ...}
        None => match payload.as_object() {
            Some(map) if map.keys().any(|k| LeadField::from_key(k).is_some()) => map,
            _ if reply.is_some() => {
                return ExtractionResult::Parsed {
                    candidates: Vec::new(),
                    reply: reply.unwrap_or_default(),
                };
            }
            _ => return unparsed(),
        },
    };

    let candidates = source
        .iter()
        .filter_map(|(key, value)| {
            let field = LeadField::from_key(key)?;
            candidate_from_value(field, value)
        })
        .collect();

    ExtractionResult::Parsed {
        candidates,
        reply: reply.unwrap_or_default(),
    }
}

fn candidate_from_value(field: LeadField, value: &Value) -> Option<FieldCandidate> {
    let (text, confidence) = match value {
        Value::String(s) => (s.clone(), 1.0),
        Value::Number(n) => (n.to_string(), 1.0),
        Value::Object(obj) => {
            let text = match obj.get("value")? {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            let confidence = obj
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(1.0) as f32;
            (text, confidence)
        }
        _ => return None,
    };

    // Models echo placeholders for unknown fields; treat them as absent.
    let lowered = text.trim().to_ascii_lowercase();
    if matches!(lowered.as_str(), "null" | "none" | "n/a" | "unknown" | "...") {
        return None;
    }

    Some(FieldCandidate {
        field,
        value: text,
        confidence,
    })
}

/// Extract a JSON object from LLM output that might contain markdown or extra text.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }

    // Wrapped in a markdown code block
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') && inner.ends_with('}') {
                return Some(inner);
            }
        }
    }

    // Try to find object bounds
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// Ask specifically for each field rejected this turn.
pub fn correction_prompt(rejections: &[FieldRejection]) -> String {
    rejections
        .iter()
        .map(|r| {
            format!(
                "That {} doesn't look right: {}. Could you give me a valid {}?",
                r.field.label(),
                r.reason,
                r.field.label()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fallback question for the next missing field.
pub fn next_field_prompt(missing: &[LeadField]) -> String {
    match missing.first() {
        Some(LeadField::Name) => "Could I get your name, please?".to_string(),
        Some(LeadField::Email) => "What's the best email address to reach you?".to_string(),
        Some(LeadField::Phone) => "And what phone number can we call you on?".to_string(),
        Some(LeadField::Requirement) => "What can we help you with?".to_string(),
        None => "Thanks, I have everything I need.".to_string(),
    }
}

/// Summary shown before the lead is created.
pub fn confirmation_prompt(record: &LeadRecord) -> String {
    let mut lines = vec!["Here's what I have:".to_string()];
    for field in LeadField::ALL {
        lines.push(format!(
            "- {}: {}",
            field.label(),
            record.value(field).unwrap_or("-")
        ));
    }
    lines.push("Shall I register this as a new lead? (yes/no)".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_lists_all_fields() {
        let prompt = lead_system_prompt();
        for field in ["Name", "Email", "Phone", "Requirement"] {
            assert!(prompt.contains(field));
        }
    }

    #[test]
    fn history_window_keeps_latest_turns() {
        let history = vec![
            ConversationTurn::user("first"),
            ConversationTurn::assistant("second"),
            ConversationTurn::user("third"),
        ];
        let text = render_history(&history, 2);
        assert_eq!(text, "Assistant: second\nUser: third");
        assert_eq!(render_history(&history, 10).lines().count(), 3);
    }

    #[test]
    fn extraction_prompt_includes_record_and_missing() {
        let mut tracker = LeadTracker::new();
        tracker
            .merge(&ExtractionResult::Parsed {
                candidates: vec![
                    FieldCandidate {
                        field: LeadField::Name,
                        value: "Bob".into(),
                        confidence: 1.0,
                    },
                    FieldCandidate {
                        field: LeadField::Email,
                        value: "bob@@x".into(),
                        confidence: 1.0,
                    },
                ],
                reply: String::new(),
            })
            .unwrap();

        let prompt = extraction_prompt("User: I'm Bob, bob@@x", &tracker);
        assert!(prompt.contains("User: I'm Bob, bob@@x"));
        assert!(prompt.contains("**name:** Bob"));
        assert!(prompt.contains("Missing fields: email, phone, requirement"));
        assert!(prompt.contains("Rejected values"));
        assert!(prompt.contains("bob@@x"));
        assert!(prompt.contains("\"reply\""));
    }

    #[test]
    fn parse_structured_payload() {
        let raw = r#"{"fields": {"name": {"value": "Alice", "confidence": 0.95},
            "email": "alice@example.com", "phone": null, "requirement": null},
            "reply": "Thanks Alice! What's your phone number?"}"#;
        let result = parse_extraction_response(raw);
        let candidates = result.candidates();
        assert_eq!(candidates.len(), 2);
        let name = candidates.iter().find(|c| c.field == LeadField::Name).unwrap();
        assert_eq!(name.value, "Alice");
        assert!((name.confidence - 0.95).abs() < 1e-6);
        let email = candidates.iter().find(|c| c.field == LeadField::Email).unwrap();
        assert_eq!(email.confidence, 1.0);
        assert_eq!(result.reply(), "Thanks Alice! What's your phone number?");
    }

    #[test]
    fn parse_flat_payload_with_plural_requirements() {
        let raw = r#"{"name": "Alice", "email": "...", "phone": "555-1234", "requirements": "a website"}"#;
        let result = parse_extraction_response(raw);
        assert!(!result.is_unparsed());
        let fields: Vec<_> = result.candidates().iter().map(|c| c.field).collect();
        assert!(fields.contains(&LeadField::Requirement));
        assert!(fields.contains(&LeadField::Phone));
        assert!(!fields.contains(&LeadField::Email));
        assert_eq!(result.reply(), "");
    }

    #[test]
    fn parse_markdown_wrapped_payload() {
        let raw = "Sure!\n```json\n{\"fields\": {\"phone\": \"555-1234\"}, \"reply\": \"Got it.\"}\n```";
        let result = parse_extraction_response(raw);
        assert_eq!(result.candidates().len(), 1);
        assert_eq!(result.reply(), "Got it.");
    }

    #[test]
    fn parse_reply_only_payload() {
        let result = parse_extraction_response(r#"{"reply": "Hello! What's your name?"}"#);
        assert!(result.candidates().is_empty());
        assert!(!result.is_unparsed());
        assert_eq!(result.reply(), "Hello! What's your name?");
    }

    #[test]
    fn malformed_output_is_unparsed_with_clarification() {
        for raw in [
            "I think your name is Alice",
            "{not json}",
            "[1, 2, 3]",
            r#"{"fields": "Alice"}"#,
            r#"{"unrelated": true}"#,
        ] {
            let result = parse_extraction_response(raw);
            assert!(result.is_unparsed(), "{raw:?} should be unparsed");
            assert!(result.candidates().is_empty());
            assert_eq!(result.reply(), CLARIFICATION_REPLY);
        }
    }

    #[test]
    fn extract_json_object_variants() {
        assert_eq!(extract_json_object(r#"{"a": 1}"#), Some(r#"{"a": 1}"#));
        assert_eq!(
            extract_json_object("```json\n{\"a\": 1}\n```"),
            Some("{\"a\": 1}")
        );
        assert_eq!(
            extract_json_object("result: {\"a\": 1} done"),
            Some("{\"a\": 1}")
        );
        assert_eq!(extract_json_object("no braces here"), None);
    }

    #[test]
    fn correction_prompt_names_field_and_value() {
        let prompt = correction_prompt(&[FieldRejection {
            field: LeadField::Email,
            value: "alice@@bad".into(),
            reason: "\"alice@@bad\" is not a valid email address".into(),
        }]);
        assert!(prompt.contains("valid email address"));
        assert!(prompt.contains("alice@@bad"));
    }

    #[test]
    fn next_field_prompt_follows_order() {
        assert!(next_field_prompt(&[LeadField::Email, LeadField::Phone]).contains("email"));
        assert!(next_field_prompt(&[]).contains("everything"));
    }
}
