//! Error types for lead intake.

use std::time::Duration;

use crate::lead::model::LeadField;
use crate::lead::state::LeadPhase;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("CRM error: {0}")]
    Crm(#[from] CrmError),

    #[error("Lead state error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}: {reason}")]
    AuthFailed { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether retrying with the same credentials cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthFailed { .. })
    }
}

/// Transport failures while extracting fields.
///
/// Malformed model output is not an error here; it surfaces as an
/// unparsed extraction result.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Language model temporarily unavailable: {0}")]
    TransientProvider(#[source] LlmError),

    #[error("Language model rejected the request: {0}")]
    FatalProvider(#[source] LlmError),
}

/// CRM submission errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CrmError {
    #[error("CRM authentication failed: {0}")]
    Authentication(String),

    #[error("CRM unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("CRM rejected the lead: {message}")]
    SchemaRejection {
        message: String,
        field: Option<LeadField>,
    },
}

/// Lead state machine errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("Lead already submitted, no further changes accepted")]
    AlreadySubmitted,

    #[error("Lead is {phase}, expected ready_to_submit")]
    NotReady { phase: LeadPhase },
}

/// Dialogue session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Cannot submit: lead is {phase}, not ready_to_submit")]
    NotReady { phase: LeadPhase },

    #[error("There's no failed submission to retry")]
    NoRetryAvailable,

    #[error("Session halted: {0}")]
    Halted(String),
}
