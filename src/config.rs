//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

/// Default Odoo endpoint started by the provisioning script.
pub const DEFAULT_ODOO_URL: &str = "http://localhost:8069";

/// Default Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Per-session credentials.
///
/// Field names deserialize from the options `geminiApiKey`, `odooUrl`,
/// `odooDb`, `odooUser` and `odooPassword`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub gemini_api_key: SecretString,
    #[serde(default = "default_odoo_url")]
    pub odoo_url: String,
    #[serde(default = "default_odoo_db")]
    pub odoo_db: String,
    #[serde(default = "default_odoo_user")]
    pub odoo_user: String,
    pub odoo_password: SecretString,
}

fn default_odoo_url() -> String {
    DEFAULT_ODOO_URL.to_string()
}

fn default_odoo_db() -> String {
    "odoo".to_string()
}

fn default_odoo_user() -> String {
    "admin".to_string()
}

impl SessionConfig {
    /// Load credentials from `GEMINI_API_KEY`, `ODOO_URL`, `ODOO_DB`,
    /// `ODOO_USER` and `ODOO_PASSWORD`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            gemini_api_key: SecretString::from(required_env("GEMINI_API_KEY")?),
            odoo_url: std::env::var("ODOO_URL").unwrap_or_else(|_| default_odoo_url()),
            odoo_db: std::env::var("ODOO_DB").unwrap_or_else(|_| default_odoo_db()),
            odoo_user: std::env::var("ODOO_USER").unwrap_or_else(|_| default_odoo_user()),
            odoo_password: SecretString::from(required_env("ODOO_PASSWORD")?),
        })
    }

    /// Parse credentials from a JSON options object.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// Dialogue behaviour settings.
#[derive(Debug, Clone)]
pub struct DialogueConfig {
    /// Gemini model name.
    pub model: String,
    /// Number of most recent turns rendered into the extraction prompt.
    pub history_window: usize,
    /// Caller-level timeout around each LLM call.
    pub llm_timeout: Duration,
    /// Caller-level timeout around each CRM call.
    pub crm_timeout: Duration,
    /// Ask the user before creating the lead.
    pub confirm_before_submit: bool,
    /// Sampling temperature for extraction.
    pub temperature: f32,
    /// Max tokens for one extraction response.
    pub max_tokens: u32,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            history_window: 20,
            llm_timeout: Duration::from_secs(30),
            crm_timeout: Duration::from_secs(15),
            confirm_before_submit: true,
            temperature: 0.2,
            max_tokens: 1024,
        }
    }
}

impl DialogueConfig {
    /// Load from `LEAD_INTAKE_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            model: std::env::var("LEAD_INTAKE_MODEL").unwrap_or(defaults.model),
            history_window: parse_env("LEAD_INTAKE_HISTORY_WINDOW")?
                .unwrap_or(defaults.history_window),
            llm_timeout: parse_env("LEAD_INTAKE_LLM_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.llm_timeout),
            crm_timeout: parse_env("LEAD_INTAKE_CRM_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.crm_timeout),
            confirm_before_submit: parse_env("LEAD_INTAKE_CONFIRM")?
                .unwrap_or(defaults.confirm_before_submit),
            temperature: parse_env("LEAD_INTAKE_TEMPERATURE")?.unwrap_or(defaults.temperature),
            max_tokens: parse_env("LEAD_INTAKE_MAX_TOKENS")?.unwrap_or(defaults.max_tokens),
        })
    }
}

fn required_env(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
