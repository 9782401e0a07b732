//! Main agent loop — routes channel messages to per-sender dialogue sessions.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;

use crate::agent::session::{DialogueSession, SessionStatus};
use crate::agent::submission::{HELP_TEXT, Submission, SubmissionParser};
use crate::channels::{Channel, IncomingMessage, OutgoingResponse, StatusUpdate};
use crate::config::DialogueConfig;
use crate::crm::{CrmBackend, SubmissionOutcome};
use crate::error::Error;
use crate::lead::{Extractor, ExtractorConfig};
use crate::llm::LlmProvider;

/// Core dependencies for the agent.
pub struct AgentDeps {
    pub llm: Arc<dyn LlmProvider>,
    pub crm: Arc<dyn CrmBackend>,
}

/// Owns the channel and one `DialogueSession` per sender.
pub struct Agent {
    config: DialogueConfig,
    extractor: Arc<Extractor>,
    crm: Arc<dyn CrmBackend>,
    channel: Box<dyn Channel>,
    sessions: HashMap<String, DialogueSession>,
}

impl Agent {
    pub fn new(config: DialogueConfig, deps: AgentDeps, channel: Box<dyn Channel>) -> Self {
        let extractor = Arc::new(Extractor::new(deps.llm, ExtractorConfig::from(&config)));
        Self {
            config,
            extractor,
            crm: deps.crm,
            channel,
            sessions: HashMap::new(),
        }
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session(&self, user_id: &str) -> Option<&DialogueSession> {
        self.sessions.get(user_id)
    }

    /// Run the agent main loop.
    pub async fn run(mut self) -> Result<(), Error> {
        let mut message_stream = self.channel.start().await?;

        tracing::info!(
            channel = self.channel.name(),
            model = %self.config.model,
            crm = self.crm.name(),
            "Lead intake ready and listening"
        );

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("Channel stream ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            match self.handle_message(&message).await {
                Ok(Some(response)) if !response.is_empty() => {
                    if let Err(e) = self
                        .channel
                        .respond(&message, OutgoingResponse::text(response))
                        .await
                    {
                        tracing::error!("Failed to send response: {}", e);
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::info!("Quit command received, exiting...");
                    break;
                }
                Err(e) => {
                    tracing::error!("Error handling message: {}", e);
                    let _ = self
                        .channel
                        .respond(&message, OutgoingResponse::text(format!("Error: {}", e)))
                        .await;
                }
            }
        }

        tracing::info!(open_sessions = self.sessions.len(), "Agent shutting down...");
        self.channel.shutdown().await?;
        Ok(())
    }

    /// Handle one message. `Ok(None)` means the user asked to quit.
    pub async fn handle_message(
        &mut self,
        message: &IncomingMessage,
    ) -> Result<Option<String>, Error> {
        let submission = SubmissionParser::parse(&message.content);

        tracing::debug!(
            "Received message from {} on {} ({} chars)",
            message.user_id,
            message.channel,
            message.content.len()
        );

        let user_id = message.user_id.as_str();
        let text = match submission {
            Submission::Quit => return Ok(None),
            Submission::Help => HELP_TEXT.to_string(),
            Submission::Reset => {
                if let Some(old) = self.sessions.remove(user_id) {
                    tracing::info!(session_id = %old.id(), "Session reset by user");
                }
                "Starting fresh. What's your name, and what can we help you with?".to_string()
            }
            Submission::Status => self.session_mut(user_id).status_report(),
            Submission::UserInput { content } => {
                self.status(StatusUpdate::Thinking("Reading your message".into()))
                    .await;
                self.session_mut(user_id).handle_user_turn(&content).await.text
            }
            Submission::Confirmation { approved } => {
                let pending =
                    *self.session_mut(user_id).status() == SessionStatus::AwaitingConfirmation;
                if pending {
                    if approved {
                        self.status(StatusUpdate::Submitting).await;
                    }
                    self.session_mut(user_id).confirm(approved).await.text
                } else {
                    // A bare "yes"/"no" outside a confirmation is just conversation.
                    let content = if approved { "yes" } else { "no" };
                    self.session_mut(user_id).handle_user_turn(content).await.text
                }
            }
            Submission::Retry => {
                self.status(StatusUpdate::Submitting).await;
                self.session_mut(user_id).retry_submission().await.text
            }
            Submission::Submit => {
                self.status(StatusUpdate::Submitting).await;
                match self.session_mut(user_id).submit().await {
                    Ok(SubmissionOutcome::Created { lead_id }) => {
                        format!("Done! Your request is registered as lead #{lead_id}.")
                    }
                    Ok(SubmissionOutcome::Failed { message, .. }) => message,
                    Err(e) => e.to_string(),
                }
            }
        };

        if let Some(session) = self.sessions.get(user_id)
            && session.status().is_finished()
        {
            tracing::info!(
                session_id = %session.id(),
                status = ?session.status(),
                tokens = session.usage().total(),
                "Session finished"
            );
            // Registered leads live in the CRM; a halted session stays until /reset.
            if matches!(session.status(), SessionStatus::Completed { .. }) {
                self.sessions.remove(user_id);
            }
        }

        Ok(Some(text))
    }

    fn session_mut(&mut self, user_id: &str) -> &mut DialogueSession {
        let (extractor, crm, config) = (&self.extractor, &self.crm, &self.config);
        self.sessions
            .entry(user_id.to_string())
            .or_insert_with(|| DialogueSession::new(extractor.clone(), crm.clone(), config))
    }

    async fn status(&self, update: StatusUpdate) {
        if let Err(e) = self.channel.send_status(update).await {
            tracing::debug!("Failed to send status update: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use super::*;
    use crate::channels::MessageStream;
    use crate::crm::{LeadId, LeadPayload};
    use crate::error::{ChannelError, CrmError, LlmError};
    use crate::lead::LeadPhase;
    use crate::llm::{CompletionRequest, CompletionResponse, FinishReason};

    struct FixedLlm(&'static str);

    #[async_trait]
    impl LlmProvider for FixedLlm {
        fn model_name(&self) -> &str {
            "fixed"
        }

        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: self.0.to_string(),
                input_tokens: 1,
                output_tokens: 1,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    struct OkCrm;

    #[async_trait]
    impl CrmBackend for OkCrm {
        fn name(&self) -> &str {
            "ok"
        }

        async fn create_lead(&self, _payload: &LeadPayload) -> Result<LeadId, CrmError> {
            Ok(LeadId(99))
        }
    }

    struct NullChannel;

    #[async_trait]
    impl Channel for NullChannel {
        fn name(&self) -> &str {
            "null"
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn respond(
            &self,
            _msg: &IncomingMessage,
            _response: OutgoingResponse,
        ) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    const ALICE: &str = r#"{"fields": {"name": "Alice", "email": "alice@example.com",
        "phone": "555-1234", "requirement": "need a website"}, "reply": "Thanks!"}"#;

    fn agent() -> Agent {
        Agent::new(
            DialogueConfig::default(),
            AgentDeps {
                llm: Arc::new(FixedLlm(ALICE)),
                crm: Arc::new(OkCrm),
            },
            Box::new(NullChannel),
        )
    }

    fn msg(user: &str, content: &str) -> IncomingMessage {
        IncomingMessage::new("test", user, content)
    }

    #[tokio::test]
    async fn quit_returns_none() {
        let mut agent = agent();
        assert!(agent.handle_message(&msg("u1", "/quit")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sessions_are_per_sender() {
        let mut agent = agent();
        agent.handle_message(&msg("u1", "I'm Alice")).await.unwrap();
        agent.handle_message(&msg("u2", "hello")).await.unwrap();
        assert_eq!(agent.session_count(), 2);
    }

    #[tokio::test]
    async fn yes_confirms_and_submits() {
        let mut agent = agent();
        let reply = agent.handle_message(&msg("u1", "I'm Alice ...")).await.unwrap();
        assert!(reply.unwrap().contains("Shall I register"));

        let reply = agent.handle_message(&msg("u1", "yes")).await.unwrap().unwrap();
        assert!(reply.contains("#99"));
        assert!(agent.session("u1").is_none());
        assert_eq!(agent.session_count(), 0);
    }

    #[tokio::test]
    async fn next_message_after_registration_starts_a_new_lead() {
        let mut agent = agent();
        agent.handle_message(&msg("u1", "I'm Alice ...")).await.unwrap();
        agent.handle_message(&msg("u1", "yes")).await.unwrap();

        let reply = agent.handle_message(&msg("u1", "I'm Alice ...")).await.unwrap().unwrap();
        assert!(reply.contains("Shall I register"));
        assert_eq!(
            agent.session("u1").unwrap().tracker().phase(),
            LeadPhase::ReadyToSubmit
        );
    }

    #[tokio::test]
    async fn submit_command_before_ready_reports_precondition() {
        let mut agent = Agent::new(
            DialogueConfig::default(),
            AgentDeps {
                llm: Arc::new(FixedLlm(r#"{"fields": {"name": "Bob"}, "reply": "Hi Bob"}"#)),
                crm: Arc::new(OkCrm),
            },
            Box::new(NullChannel),
        );
        agent.handle_message(&msg("u1", "I'm Bob")).await.unwrap();
        let reply = agent.handle_message(&msg("u1", "/submit")).await.unwrap().unwrap();
        assert!(reply.contains("not ready_to_submit"));
    }

    #[tokio::test]
    async fn reset_drops_session() {
        let mut agent = agent();
        agent.handle_message(&msg("u1", "I'm Alice")).await.unwrap();
        agent.handle_message(&msg("u1", "/reset")).await.unwrap();
        assert_eq!(agent.session_count(), 0);
    }

    #[tokio::test]
    async fn help_and_status() {
        let mut agent = agent();
        let help = agent.handle_message(&msg("u1", "/help")).await.unwrap().unwrap();
        assert!(help.contains("/retry"));

        let status = agent.handle_message(&msg("u1", "/status")).await.unwrap().unwrap();
        assert!(status.contains("Lead status: collecting"));
    }
}
