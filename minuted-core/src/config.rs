//! Configuration system for Minuted.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! environment. Configuration is loaded from `~/.config/minuted/config.toml`
//! (or an explicit path) with `MINUTED_`-prefixed environment overrides.
//!
//! The reference values the pipeline depends on (publish interval, chunk
//! budget, retrieval limit) live here as tunable defaults, not contract
//! constants.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Top-level configuration for the Minuted pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub chunker: ChunkerConfig,
    pub retriever: RetrieverConfig,
    pub publish: PublishConfig,
    pub engine: EngineConfig,
    pub queue: QueueConfig,
    /// Path to the SQLite database. Defaults to the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider kind: "anthropic" or any OpenAI-compatible endpoint.
    pub provider: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Override the provider base URL (e.g. a local gateway).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
            temperature: 0.3,
            max_tokens: 4096,
        }
    }
}

/// Transcript chunking parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Token budget per chunk.
    pub max_tokens: usize,
    /// Fixed characters-per-token approximation.
    pub chars_per_token: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            chars_per_token: 4,
        }
    }
}

/// Retrieval parameters for RAG context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverConfig {
    /// Maximum chunks fed into the meeting prompt as context.
    pub chunk_limit: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self { chunk_limit: 10 }
    }
}

/// Publish-rate policy for streaming content updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Minimum interval between content-replace publishes for one message.
    /// Finalization always flushes regardless of this interval.
    pub interval_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self { interval_ms: 50 }
    }
}

/// Completion engine limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on tool-call rounds per turn. The reference behavior had
    /// no observed bound; this cap prevents unbounded loops against a buggy
    /// or adversarial tool-calling model.
    pub max_rounds: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_rounds: 8 }
    }
}

/// Turn queue behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Attempts per turn, counting the first. Only transient provider errors
    /// trigger another attempt.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    /// Depth of the enqueue channel before `enqueue` awaits.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            capacity: 64,
        }
    }
}

impl AppConfig {
    /// Resolve the database path, falling back to the platform data dir.
    pub fn database_path(&self) -> PathBuf {
        if let Some(ref path) = self.database_path {
            return path.clone();
        }
        directories::ProjectDirs::from("", "", "minuted")
            .map(|dirs| dirs.data_dir().join("minuted.db"))
            .unwrap_or_else(|| PathBuf::from("minuted.db"))
    }
}

/// Load configuration: defaults, then an optional TOML file, then
/// `MINUTED_`-prefixed environment variables (`__` as section separator,
/// e.g. `MINUTED_LLM__MODEL`).
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    } else if let Some(dirs) = directories::ProjectDirs::from("", "", "minuted") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    figment = figment.merge(Env::prefixed("MINUTED_").split("__"));

    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

/// Initialize tracing with an env-filter (`MINUTED_LOG`, default `info`).
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_env("MINUTED_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.temperature, 0.3);
        assert_eq!(config.chunker.max_tokens, 500);
        assert_eq!(config.chunker.chars_per_token, 4);
        assert_eq!(config.retriever.chunk_limit, 10);
        assert_eq!(config.publish.interval_ms, 50);
        assert_eq!(config.engine.max_rounds, 8);
        assert_eq!(config.queue.max_attempts, 3);
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[llm]
provider = "openai"
model = "gpt-4o-mini"
api_key_env = "OPENAI_API_KEY"
temperature = 0.2
max_tokens = 2048

[publish]
interval_ms = 100

[chunker]
max_tokens = 300
"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.publish.interval_ms, 100);
        assert_eq!(config.chunker.max_tokens, 300);
        // Untouched sections keep their defaults
        assert_eq!(config.retriever.chunk_limit, 10);
        assert_eq!(config.engine.max_rounds, 8);
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[queue]\nmax_attempts = 5\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.queue.initial_backoff_ms, 1000);
        assert_eq!(config.llm.provider, "anthropic");
    }

    #[test]
    fn test_database_path_override() {
        let config = AppConfig {
            database_path: Some(PathBuf::from("/tmp/test.db")),
            ..Default::default()
        };
        assert_eq!(config.database_path(), PathBuf::from("/tmp/test.db"));
    }
}
