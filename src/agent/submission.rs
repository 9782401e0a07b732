//! Submission types for the dialogue loop.
//!
//! Every incoming message is parsed into a `Submission` before it reaches
//! the session: slash commands and yes/no answers are handled by the agent,
//! everything else is a conversational turn.

use serde::{Deserialize, Serialize};

/// Parses user input into Submission types.
pub struct SubmissionParser;

impl SubmissionParser {
    /// Parse message content into a Submission.
    pub fn parse(content: &str) -> Submission {
        let trimmed = content.trim();
        let lower = trimmed.to_lowercase();

        match lower.as_str() {
            "/help" | "/?" => Submission::Help,
            "/status" => Submission::Status,
            "/reset" | "/new" => Submission::Reset,
            "/retry" => Submission::Retry,
            "/submit" => Submission::Submit,
            "/quit" | "/exit" => Submission::Quit,

            // Confirmation keywords
            "yes" | "y" | "ok" | "sure" | "confirm" => Submission::Confirmation { approved: true },
            "no" | "n" | "cancel" => Submission::Confirmation { approved: false },

            _ => Submission::UserInput {
                content: content.to_string(),
            },
        }
    }
}

/// A submission to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Submission {
    /// Free text for the extraction engine.
    UserInput { content: String },

    /// Answer to "Shall I register this lead?".
    Confirmation { approved: bool },

    /// Retry a submission that failed because the CRM was unreachable.
    Retry,

    /// Submit without waiting for a confirmation prompt.
    Submit,

    /// Show the current lead record.
    Status,

    /// Drop the session and start a new lead.
    Reset,

    Help,

    Quit,
}

/// Text shown for `/help`.
pub const HELP_TEXT: &str = "\
Tell me about yourself and what you need; I'll collect your name, email, \
phone number and requirement.

Commands:
  /status   show what I have so far
  /submit   register the lead now (once every detail is collected)
  /retry    retry a submission that failed because the CRM was unreachable
  /reset    start over with a new lead
  /quit     leave";
