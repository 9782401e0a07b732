//! Dialogue session — sequences one user turn at a time through extraction,
//! merge, confirmation and CRM submission.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DialogueConfig;
use crate::crm::{CrmBackend, LeadId, LeadPayload, SubmissionOutcome};
use crate::error::{CrmError, ExtractionError, SessionError, TrackerError};
use crate::lead::prompts::{confirmation_prompt, correction_prompt, next_field_prompt};
use crate::lead::{ConversationTurn, Extractor, LeadField, LeadPhase, LeadTracker, TokenUsage};

/// Where the conversation stands, from the user's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Collecting,
    /// Lead is complete; waiting for yes/no.
    AwaitingConfirmation,
    /// CRM was unreachable; one retry is on offer.
    AwaitingRetry,
    Completed { lead_id: LeadId },
    Halted { reason: String },
}

impl SessionStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Halted { .. })
    }
}

/// What to show the user after a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub text: String,
    pub status: SessionStatus,
}

/// Remote-unavailable failures tolerated before the session halts.
const MAX_REMOTE_FAILURES: u32 = 2;

/// One end-to-end conversation. Owns its history and lead record.
pub struct DialogueSession {
    id: Uuid,
    extractor: Arc<Extractor>,
    crm: Arc<dyn CrmBackend>,
    crm_timeout: Duration,
    confirm_before_submit: bool,
    history: Vec<ConversationTurn>,
    tracker: LeadTracker,
    status: SessionStatus,
    remote_failures: u32,
    usage: TokenUsage,
}

impl DialogueSession {
    pub fn new(extractor: Arc<Extractor>, crm: Arc<dyn CrmBackend>, config: &DialogueConfig) -> Self {
        let id = Uuid::new_v4();
        info!(session_id = %id, "Dialogue session started");
        Self {
            id,
            extractor,
            crm,
            crm_timeout: config.crm_timeout,
            confirm_before_submit: config.confirm_before_submit,
            history: Vec::new(),
            tracker: LeadTracker::new(),
            status: SessionStatus::Collecting,
            remote_failures: 0,
            usage: TokenUsage::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tracker(&self) -> &LeadTracker {
        &self.tracker
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn usage(&self) -> &TokenUsage {
        &self.usage
    }

    /// Process one free-text user turn.
    pub async fn handle_user_turn(&mut self, text: &str) -> TurnReply {
        if let Some(reply) = self.finished_reply() {
            return reply;
        }

        self.history.push(ConversationTurn::user(text));

        let extraction = match self.extractor.extract(&self.history, &self.tracker).await {
            Ok(extraction) => extraction,
            Err(ExtractionError::TransientProvider(e)) => {
                warn!(session_id = %self.id, error = %e, "Extraction failed, asking user to resend");
                // Drop the turn so a resend doesn't appear twice in history.
                self.history.pop();
                return self.reply(format!(
                    "Sorry, I'm having trouble reaching the assistant service right now ({e}). \
                     Please send that again."
                ));
            }
            Err(ExtractionError::FatalProvider(e)) => {
                warn!(session_id = %self.id, error = %e, "Language model rejected credentials");
                let reason = format!("the language model rejected our credentials ({e})");
                let text = format!(
                    "Sorry, {reason}. Please check the Gemini API key and quota, \
                     then start a new session."
                );
                self.status = SessionStatus::Halted { reason };
                return self.reply(text);
            }
        };
        self.usage.add(&extraction.usage);

        let outcome = match self.tracker.merge(&extraction.result) {
            Ok(outcome) => outcome,
            Err(TrackerError::AlreadySubmitted) | Err(TrackerError::NotReady { .. }) => {
                return self.finished_reply().unwrap_or_else(|| {
                    self.reply("This lead can no longer be changed.".to_string())
                });
            }
        };

        info!(
            session_id = %self.id,
            accepted = ?outcome.accepted,
            rejected = outcome.rejected.len(),
            phase = %self.tracker.phase(),
            "Merged extraction"
        );

        let mut parts = Vec::new();
        let model_reply = extraction.result.reply().trim();
        if !model_reply.is_empty() {
            parts.push(model_reply.to_string());
        }
        if !outcome.rejected.is_empty() {
            parts.push(correction_prompt(&outcome.rejected));
        }

        if self.tracker.phase() == LeadPhase::ReadyToSubmit && !outcome.rejected.is_empty() {
            // A failed correction: wait for a valid value before confirming.
            self.status = SessionStatus::Collecting;
        } else if self.tracker.phase() == LeadPhase::ReadyToSubmit {
            if self.confirm_before_submit {
                parts.push(confirmation_prompt(self.tracker.record()));
                self.status = SessionStatus::AwaitingConfirmation;
            } else {
                if !parts.is_empty() {
                    self.history.push(ConversationTurn::assistant(parts.join("\n\n")));
                }
                return self.submit_and_reply().await;
            }
        } else {
            if parts.is_empty() {
                parts.push(next_field_prompt(&self.tracker.missing_fields()));
            }
            self.status = SessionStatus::Collecting;
        }

        self.reply(parts.join("\n\n"))
    }

    /// Answer a pending confirmation.
    pub async fn confirm(&mut self, approved: bool) -> TurnReply {
        if let Some(reply) = self.finished_reply() {
            return reply;
        }
        if self.status != SessionStatus::AwaitingConfirmation {
            let prompt = next_field_prompt(&self.tracker.missing_fields());
            return self.reply(format!("There's nothing to confirm yet. {prompt}"));
        }
        if approved {
            self.submit_and_reply().await
        } else {
            self.status = SessionStatus::Collecting;
            self.reply("No problem. What would you like to change?".to_string())
        }
    }

    /// Use the single retry offered after the CRM was unreachable.
    pub async fn retry_submission(&mut self) -> TurnReply {
        if self.status != SessionStatus::AwaitingRetry {
            return self.reply(SessionError::NoRetryAvailable.to_string());
        }
        self.submit_and_reply().await
    }

    /// Send the lead to the CRM.
    ///
    /// Only allowed while the lead is ReadyToSubmit; any other phase fails
    /// without contacting the CRM.
    pub async fn submit(&mut self) -> Result<SubmissionOutcome, SessionError> {
        if let SessionStatus::Halted { reason } = &self.status {
            return Err(SessionError::Halted(reason.clone()));
        }
        let phase = self.tracker.phase();
        if phase != LeadPhase::ReadyToSubmit {
            return Err(SessionError::NotReady { phase });
        }
        let payload =
            LeadPayload::from_record(self.tracker.record()).ok_or(SessionError::NotReady { phase })?;

        info!(session_id = %self.id, crm = self.crm.name(), "Submitting lead");
        let result = match tokio::time::timeout(self.crm_timeout, self.crm.create_lead(&payload)).await
        {
            Ok(result) => result,
            Err(_) => Err(CrmError::RemoteUnavailable(format!(
                "no response within {:?}",
                self.crm_timeout
            ))),
        };

        match result {
            Ok(lead_id) => {
                self.tracker
                    .mark_submitted()
                    .map_err(|_| SessionError::NotReady { phase })?;
                self.status = SessionStatus::Completed { lead_id };
                info!(
                    session_id = %self.id,
                    %lead_id,
                    total_tokens = self.usage.total(),
                    cost = %self.usage.cost,
                    "Lead submitted"
                );
                Ok(SubmissionOutcome::Created { lead_id })
            }
            Err(error) => {
                warn!(session_id = %self.id, error = %error, "Lead submission failed");
                self.apply_failure(&error);
                Ok(SubmissionOutcome::failed(error))
            }
        }
    }

    fn apply_failure(&mut self, error: &CrmError) {
        match error {
            CrmError::Authentication(_) => {
                // Record stays ReadyToSubmit so the user can confirm again later.
                self.status = SessionStatus::AwaitingConfirmation;
            }
            CrmError::RemoteUnavailable(msg) => {
                self.remote_failures += 1;
                self.status = if self.remote_failures >= MAX_REMOTE_FAILURES {
                    SessionStatus::Halted {
                        reason: format!("CRM unavailable: {msg}"),
                    }
                } else {
                    SessionStatus::AwaitingRetry
                };
            }
            CrmError::SchemaRejection { message, field } => {
                if let Some(field) = field {
                    if let Err(e) = self.tracker.reopen(*field, message.clone()) {
                        warn!(session_id = %self.id, error = %e, "Could not reopen field");
                    }
                }
                self.status = SessionStatus::Collecting;
            }
        }
    }

    async fn submit_and_reply(&mut self) -> TurnReply {
        let text = match self.submit().await {
            Ok(SubmissionOutcome::Created { lead_id }) => {
                let name = self
                    .tracker
                    .record()
                    .value(LeadField::Name)
                    .unwrap_or("there")
                    .to_string();
                format!(
                    "All set, {name}! Your request is registered as lead #{lead_id}. \
                     Someone from our team will be in touch soon."
                )
            }
            Ok(SubmissionOutcome::Failed { error, message }) => match error {
                CrmError::Authentication(_) => format!(
                    "{message}. The CRM credentials need fixing; \
                     answer yes to try again once they are updated."
                ),
                CrmError::RemoteUnavailable(_) => match self.status {
                    SessionStatus::AwaitingRetry => format!(
                        "{message}. Type /retry to try once more."
                    ),
                    _ => format!("{message}. Please try again later."),
                },
                CrmError::SchemaRejection { field, .. } => match field {
                    Some(field) => format!(
                        "{message}. Could you give me a different {}?",
                        field.label()
                    ),
                    None => format!("{message}. Which detail should I change?"),
                },
            },
            Err(e) => e.to_string(),
        };
        self.reply(text)
    }

    fn finished_reply(&self) -> Option<TurnReply> {
        let text = match &self.status {
            SessionStatus::Completed { lead_id } => format!(
                "This lead is already registered as #{lead_id}. Type /reset to start a new one."
            ),
            SessionStatus::Halted { reason } => {
                format!("This session has stopped: {reason}. Type /reset to start over.")
            }
            _ => return None,
        };
        Some(TurnReply {
            text,
            status: self.status.clone(),
        })
    }

    fn reply(&mut self, text: String) -> TurnReply {
        self.history.push(ConversationTurn::assistant(text.clone()));
        TurnReply {
            text,
            status: self.status.clone(),
        }
    }

    /// Human-readable summary for `/status`.
    pub fn status_report(&self) -> String {
        let mut lines = vec![format!("Lead status: {}", self.tracker.phase())];
        for field in LeadField::ALL {
            let value = self.tracker.record().value(field).unwrap_or("(missing)");
            lines.push(format!("- {}: {}", field.label(), value));
        }
        for rejection in self.tracker.rejections() {
            lines.push(format!(
                "! {} rejected: {}",
                rejection.field.label(),
                rejection.reason
            ));
        }
        lines.push(format!(
            "Tokens used: {} (~${})",
            self.usage.total(),
            self.usage.cost.round_dp(4)
        ));
        lines.join("\n")
    }
}
