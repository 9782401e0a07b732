//! LLM integration for lead intake.
//!
//! Supports:
//! - **Gemini**: `generateContent` over HTTPS via reqwest
//!
//! Callers depend on the `LlmProvider` trait so tests can swap in stubs.

pub mod costs;
pub mod gemini;
pub mod provider;

pub use gemini::GeminiProvider;
pub use provider::*;

use std::sync::Arc;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Gemini,
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    /// Override for the provider host; `None` uses the public endpoint.
    pub base_url: Option<String>,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Gemini => create_gemini_provider(config),
    }
}

fn create_gemini_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = match config.base_url {
        Some(ref url) => GeminiProvider::with_base_url(config.api_key.clone(), &config.model, url)?,
        None => GeminiProvider::new(config.api_key.clone(), &config.model)?,
    };
    tracing::info!("Using Gemini (model: {})", config.model);
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_missing_key_still_constructs() {
        // The key is only checked by the remote on the first request.
        let config = LlmConfig {
            backend: LlmBackend::Gemini,
            api_key: secrecy::SecretString::from("test-key"),
            model: "gemini-2.5-flash".to_string(),
            base_url: None,
        };
        let provider = create_provider(&config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "gemini-2.5-flash");
    }

    #[test]
    fn test_provider_reports_model_pricing() {
        let config = LlmConfig {
            backend: LlmBackend::Gemini,
            api_key: secrecy::SecretString::from("test-key"),
            model: "gemini-2.5-pro".to_string(),
            base_url: Some("http://127.0.0.1:9".to_string()),
        };
        let provider = create_provider(&config).unwrap();
        let (input, output) = provider.cost_per_token();
        assert!(input > rust_decimal::Decimal::ZERO);
        assert!(output > input);
    }
}
