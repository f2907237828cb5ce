//! LLM provider factory.
//!
//! Resolves a provider name from configuration into a client.

use crate::client::LlmClient;
use crate::providers::{OllamaClient, OpenAiClient};
use crate::types::ProviderKind;
use std::sync::Arc;

/// Create an LLM client for `provider`.
///
/// # Arguments
/// * `provider` - Provider identifier ("openai" or "ollama")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - API key, required by OpenAI
///
/// # Errors
/// Returns an error if the provider is unknown or a required key is missing.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> Result<Arc<dyn LlmClient>, String> {
    let kind = ProviderKind::parse(provider)
        .ok_or_else(|| format!("Unknown provider: {}", provider))?;

    let base_url = endpoint.unwrap_or(kind.default_endpoint());

    match kind {
        ProviderKind::Ollama => Ok(Arc::new(OllamaClient::with_base_url(base_url))),
        ProviderKind::OpenAI => {
            let key = api_key
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| "OpenAI provider requires API key".to_string())?;
            Ok(Arc::new(OpenAiClient::with_base_url(key, base_url)))
        }
    }
}
