//! Lead record and conversation data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the four fields a lead needs before it can be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadField {
    Name,
    Email,
    Phone,
    Requirement,
}

impl LeadField {
    /// All fields in the order the assistant asks for them.
    pub const ALL: [LeadField; 4] = [
        LeadField::Name,
        LeadField::Email,
        LeadField::Phone,
        LeadField::Requirement,
    ];

    /// Key used in the model's JSON payload.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Requirement => "requirement",
        }
    }

    /// Resolve a payload key, accepting the plural `requirements`.
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => Some(Self::Name),
            "email" => Some(Self::Email),
            "phone" => Some(Self::Phone),
            "requirement" | "requirements" => Some(Self::Requirement),
            _ => None,
        }
    }

    /// Wording used when talking to the user.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email address",
            Self::Phone => "phone number",
            Self::Requirement => "requirement",
        }
    }
}

impl std::fmt::Display for LeadField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A validated field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: String,
    /// Extraction confidence in `[0, 1]`.
    pub confidence: f32,
}

impl FieldValue {
    pub fn new(value: impl Into<String>, confidence: f32) -> Self {
        Self {
            value: value.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// The lead under construction. Present fields are always validated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    phone: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    requirement: Option<FieldValue>,
}

impl LeadRecord {
    pub fn get(&self, field: LeadField) -> Option<&FieldValue> {
        match field {
            LeadField::Name => self.name.as_ref(),
            LeadField::Email => self.email.as_ref(),
            LeadField::Phone => self.phone.as_ref(),
            LeadField::Requirement => self.requirement.as_ref(),
        }
    }

    /// Value text for a field, if validated.
    pub fn value(&self, field: LeadField) -> Option<&str> {
        self.get(field).map(|v| v.value.as_str())
    }

    pub(crate) fn slot_mut(&mut self, field: LeadField) -> &mut Option<FieldValue> {
        match field {
            LeadField::Name => &mut self.name,
            LeadField::Email => &mut self.email,
            LeadField::Phone => &mut self.phone,
            LeadField::Requirement => &mut self.requirement,
        }
    }

    /// Fields that are not yet validated, in asking order.
    pub fn missing_fields(&self) -> Vec<LeadField> {
        LeadField::ALL
            .into_iter()
            .filter(|f| self.get(*f).is_none())
            .collect()
    }

    pub fn validated_count(&self) -> usize {
        LeadField::ALL
            .iter()
            .filter(|f| self.get(**f).is_some())
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.validated_count() == LeadField::ALL.len()
    }

    /// Render filled/missing fields as a markdown section for prompts.
    pub fn to_prompt_section(&self) -> String {
        let mut parts = vec!["# Lead so far".to_string()];
        for field in LeadField::ALL {
            match self.value(field) {
                Some(v) => parts.push(format!("- **{}:** {}", field.key(), v)),
                None => parts.push(format!("- **{}:** (missing)", field.key())),
            }
        }
        parts.join("\n")
    }
}

/// Who spoke a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

/// One entry of the append-only conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
            at: Utc::now(),
        }
    }
}
