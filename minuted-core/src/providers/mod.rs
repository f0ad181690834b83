//! LLM provider implementations.
//!
//! Concrete implementations of the `LlmProvider` trait for the Anthropic
//! Messages API (the default) and OpenAI-compatible chat-completions
//! endpoints (OpenAI, Azure, Ollama, local gateways).
//!
//! Use `create_provider()` to instantiate the provider named in config.

pub mod anthropic;
pub mod openai_compat;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatibleProvider;

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::engine::LlmProvider;
use crate::error::LlmError;

/// Resolve the API key from the environment variable named in config.
pub fn resolve_api_key(config: &LlmConfig) -> Result<String, LlmError> {
    std::env::var(&config.api_key_env).map_err(|_| LlmError::AuthFailed {
        provider: format!("env var '{}' not set", config.api_key_env),
    })
}

/// Create an LLM provider based on the configuration.
///
/// Routes `"anthropic"` to the native Messages API provider; everything else
/// goes through the OpenAI-compatible provider.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(config)?)),
        _ => Ok(Arc::new(OpenAiCompatibleProvider::new(config)?)),
    }
}
