//! Extraction engine — one LLM round trip per user turn.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::DialogueConfig;
use crate::error::{ExtractionError, LlmError};
use crate::llm::costs::call_cost;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

use super::model::{ConversationTurn, LeadField};
use super::prompts::{
    CLARIFICATION_REPLY, extraction_prompt, lead_system_prompt, parse_extraction_response,
    render_history,
};
use super::state::LeadTracker;

/// A value the model believes the user supplied for a field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCandidate {
    pub field: LeadField,
    pub value: String,
    pub confidence: f32,
}

/// Outcome of parsing one model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    /// Structured payload found.
    Parsed {
        candidates: Vec<FieldCandidate>,
        reply: String,
    },
    /// Payload missing or malformed; carries a clarification reply.
    Unparsed { raw: String, reply: String },
}

impl ExtractionResult {
    pub fn candidates(&self) -> &[FieldCandidate] {
        match self {
            Self::Parsed { candidates, .. } => candidates,
            Self::Unparsed { .. } => &[],
        }
    }

    pub fn reply(&self) -> &str {
        match self {
            Self::Parsed { reply, .. } | Self::Unparsed { reply, .. } => reply,
        }
    }

    pub fn is_unparsed(&self) -> bool {
        matches!(self, Self::Unparsed { .. })
    }
}

/// Token usage and estimated spend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost: Decimal,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cost += other.cost;
    }
}

/// Result of one extraction call.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub result: ExtractionResult,
    pub usage: TokenUsage,
}

/// Settings for the extraction call.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub history_window: usize,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&DialogueConfig> for ExtractorConfig {
    fn from(config: &DialogueConfig) -> Self {
        Self {
            history_window: config.history_window,
            timeout: config.llm_timeout,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// Turns conversation history into field candidates and a reply.
pub struct Extractor {
    llm: Arc<dyn LlmProvider>,
    config: ExtractorConfig,
}

impl Extractor {
    pub fn new(llm: Arc<dyn LlmProvider>, config: ExtractorConfig) -> Self {
        Self { llm, config }
    }

    /// Extract candidates from the latest user turn.
    ///
    /// Malformed model output is not an error; it yields
    /// `ExtractionResult::Unparsed`. Only transport failures are returned.
    pub async fn extract(
        &self,
        history: &[ConversationTurn],
        tracker: &LeadTracker,
    ) -> Result<Extraction, ExtractionError> {
        let conversation_text = render_history(history, self.config.history_window);
        let prompt = extraction_prompt(&conversation_text, tracker);

        let request = CompletionRequest::new(vec![
            ChatMessage::system(lead_system_prompt()),
            ChatMessage::user(prompt),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        debug!(
            model = self.llm.model_name(),
            turns = history.len(),
            "Requesting extraction"
        );

        let response = match tokio::time::timeout(self.config.timeout, self.llm.complete(request))
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e @ (LlmError::InvalidResponse { .. } | LlmError::Json(_)))) => {
                // Reached the model but got no usable payload (e.g. a blocked prompt).
                warn!(error = %e, "Model returned no usable content");
                return Ok(Extraction {
                    result: ExtractionResult::Unparsed {
                        raw: e.to_string(),
                        reply: CLARIFICATION_REPLY.to_string(),
                    },
                    usage: TokenUsage::default(),
                });
            }
            Ok(Err(e)) => return Err(classify(e)),
            Err(_) => {
                warn!(timeout = ?self.config.timeout, "Extraction call timed out");
                return Err(ExtractionError::TransientProvider(LlmError::Timeout {
                    provider: self.llm.model_name().to_string(),
                    timeout: self.config.timeout,
                }));
            }
        };

        let usage = TokenUsage {
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            cost: call_cost(
                self.llm.cost_per_token(),
                response.input_tokens,
                response.output_tokens,
            ),
        };

        let result = parse_extraction_response(&response.content);
        info!(
            candidates = result.candidates().len(),
            unparsed = result.is_unparsed(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Extraction complete"
        );

        Ok(Extraction { result, usage })
    }
}

fn classify(error: LlmError) -> ExtractionError {
    if error.is_fatal() {
        ExtractionError::FatalProvider(error)
    } else {
        ExtractionError::TransientProvider(error)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::llm::{CompletionResponse, FinishReason};

    /// Mock LLM that returns a fixed response and records the prompt.
    struct MockLlm {
        response: Result<String, fn() -> LlmError>,
        delay: Duration,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl MockLlm {
        fn replying(content: &str) -> Self {
            Self {
                response: Ok(content.to_string()),
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(err: fn() -> LlmError) -> Self {
            Self {
                response: Err(err),
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlm {
        fn model_name(&self) -> &str {
            "mock-extract"
        }

        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::new(1, 6), Decimal::new(2, 6))
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(request);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.response {
                Ok(content) => Ok(CompletionResponse {
                    content: content.clone(),
                    input_tokens: 100,
                    output_tokens: 50,
                    finish_reason: FinishReason::Stop,
                    response_id: None,
                }),
                Err(make) => Err(make()),
            }
        }
    }

    fn config() -> ExtractorConfig {
        ExtractorConfig {
            history_window: 4,
            timeout: Duration::from_millis(200),
            temperature: 0.0,
            max_tokens: 256,
        }
    }

    #[tokio::test]
    async fn extracts_candidates_and_reply() {
        let llm = Arc::new(MockLlm::replying(
            r#"{"fields": {"name": "Alice", "email": null}, "reply": "Hi Alice! Your email?"}"#,
        ));
        let extractor = Extractor::new(llm.clone(), config());
        let history = vec![ConversationTurn::user("I'm Alice")];

        let extraction = extractor
            .extract(&history, &LeadTracker::new())
            .await
            .unwrap();

        assert_eq!(extraction.result.candidates().len(), 1);
        assert_eq!(extraction.result.reply(), "Hi Alice! Your email?");
        assert_eq!(extraction.usage.total(), 150);
        assert_eq!(extraction.usage.cost, Decimal::new(2, 4));

        let seen = llm.seen.lock().unwrap();
        let prompt = &seen[0].messages[1].content;
        assert!(prompt.contains("User: I'm Alice"));
        assert!(prompt.contains("Missing fields: name, email, phone, requirement"));
    }

    #[tokio::test]
    async fn history_is_windowed() {
        let llm = Arc::new(MockLlm::replying(r#"{"reply": "ok"}"#));
        let extractor = Extractor::new(llm.clone(), config());
        let history: Vec<_> = (0..10)
            .map(|i| ConversationTurn::user(format!("message {i}")))
            .collect();

        extractor.extract(&history, &LeadTracker::new()).await.unwrap();

        let seen = llm.seen.lock().unwrap();
        let prompt = &seen[0].messages[1].content;
        assert!(!prompt.contains("message 5"));
        assert!(prompt.contains("message 6"));
        assert!(prompt.contains("message 9"));
    }

    #[tokio::test]
    async fn garbage_output_is_recoverable() {
        let llm = Arc::new(MockLlm::replying("Sure thing, Alice!"));
        let extractor = Extractor::new(llm, config());

        let extraction = extractor
            .extract(&[ConversationTurn::user("hi")], &LeadTracker::new())
            .await
            .unwrap();
        assert!(extraction.result.is_unparsed());
        assert!(extraction.result.candidates().is_empty());
    }

    #[tokio::test]
    async fn empty_model_response_is_unparsed_not_an_error() {
        let llm = Arc::new(MockLlm::failing(|| {
            crate::llm::gemini::parse_generate_response(
                r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#,
            )
            .unwrap_err()
        }));
        let extractor = Extractor::new(llm, config());

        let extraction = extractor
            .extract(&[ConversationTurn::user("hi")], &LeadTracker::new())
            .await
            .unwrap();
        assert!(extraction.result.is_unparsed());
        assert_eq!(extraction.result.reply(), CLARIFICATION_REPLY);
        assert_eq!(extraction.usage, TokenUsage::default());
    }

    #[tokio::test]
    async fn auth_failure_is_fatal() {
        let llm = Arc::new(MockLlm::failing(|| LlmError::AuthFailed {
            provider: "mock".into(),
            reason: "bad key".into(),
        }));
        let extractor = Extractor::new(llm, config());

        let err = extractor
            .extract(&[ConversationTurn::user("hi")], &LeadTracker::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::FatalProvider(_)));
    }

    #[tokio::test]
    async fn rate_limit_is_transient() {
        let llm = Arc::new(MockLlm::failing(|| LlmError::RateLimited {
            provider: "mock".into(),
            retry_after: None,
        }));
        let extractor = Extractor::new(llm, config());

        let err = extractor
            .extract(&[ConversationTurn::user("hi")], &LeadTracker::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::TransientProvider(_)));
    }

    #[tokio::test]
    async fn timeout_is_transient() {
        let mut llm = MockLlm::replying(r#"{"reply": "late"}"#);
        llm.delay = Duration::from_secs(5);
        let extractor = Extractor::new(Arc::new(llm), config());

        let err = extractor
            .extract(&[ConversationTurn::user("hi")], &LeadTracker::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::TransientProvider(LlmError::Timeout { .. })
        ));
    }
}
