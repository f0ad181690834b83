//! Error types for the Minuted core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the provider, engine, tool, store, broadcast, and configuration
//! domains. `MinutedError::is_transient` is the single classification point
//! deciding which failures escape a turn so the queue can retry it.

/// Top-level error type for the Minuted core library.
#[derive(Debug, thiserror::Error)]
pub enum MinutedError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MinutedError {
    /// Whether this failure is a transient provider condition worth retrying
    /// the whole turn for. Everything else is terminal for the turn.
    pub fn is_transient(&self) -> bool {
        match self {
            MinutedError::Llm(e) => e.is_transient(),
            MinutedError::Engine(EngineError::Provider(e)) => e.is_transient(),
            _ => false,
        }
    }

    /// Server-requested retry delay, when the provider sent one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            MinutedError::Llm(LlmError::RateLimited { retry_after_secs })
            | MinutedError::Engine(EngineError::Provider(LlmError::RateLimited {
                retry_after_secs,
            })) => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Streaming error: {message}")]
    Streaming { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

impl LlmError {
    /// Transient conditions: rate limiting, timeouts, connection drops, and
    /// mid-stream failures. Auth and parse failures are permanent.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. }
                | LlmError::Timeout { .. }
                | LlmError::Connection { .. }
                | LlmError::Streaming { .. }
        )
    }
}

/// Errors from the completion engine's round loop.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Provider(#[from] LlmError),

    #[error("Tool round limit ({max}) reached without a text response")]
    RoundLimit { max: usize },

    #[error("Store error during round: {0}")]
    Store(#[from] StoreError),

    #[error("Engine task failed: {message}")]
    TaskFailed { message: String },
}

/// Errors from tool registration and execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool not found: {name}")]
    NotFound { name: String },

    #[error("Tool already registered: {name}")]
    AlreadyRegistered { name: String },

    #[error("Invalid arguments for tool '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Tool '{name}' execution failed: {message}")]
    ExecutionFailed { name: String, message: String },

    #[error("Tool '{name}' timed out after {timeout_secs}s")]
    Timeout { name: String, timeout_secs: u64 },
}

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Chat not found: {id}")]
    ChatNotFound { id: uuid::Uuid },

    #[error("Message not found: {id}")]
    MessageNotFound { id: uuid::Uuid },

    #[error("Database error: {message}")]
    Database { message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database {
            message: e.to_string(),
        }
    }
}

/// Errors while publishing to the broadcast sink.
///
/// These are always caught and logged at the turn boundary; a failure to
/// report a failure must never crash the worker.
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("Publish to chat {chat_id} failed: {message}")]
    Publish {
        chat_id: uuid::Uuid,
        message: String,
    },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `MinutedError`.
pub type Result<T> = std::result::Result<T, MinutedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_llm() {
        let err = MinutedError::Llm(LlmError::ApiRequest {
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "LLM error: API request failed: connection refused"
        );
    }

    #[test]
    fn test_error_display_tool() {
        let err = MinutedError::Tool(ToolError::NotFound {
            name: "contact_lookup".into(),
        });
        assert_eq!(err.to_string(), "Tool error: Tool not found: contact_lookup");
    }

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::RateLimited { retry_after_secs: 30 }.is_transient());
        assert!(LlmError::Timeout { timeout_secs: 30 }.is_transient());
        assert!(
            LlmError::Connection {
                message: "reset".into()
            }
            .is_transient()
        );
        assert!(
            LlmError::Streaming {
                message: "eof".into()
            }
            .is_transient()
        );
        assert!(
            !LlmError::AuthFailed {
                provider: "anthropic".into()
            }
            .is_transient()
        );
        assert!(
            !LlmError::ResponseParse {
                message: "bad json".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_transient_propagates_through_engine() {
        let err = MinutedError::Engine(EngineError::Provider(LlmError::RateLimited {
            retry_after_secs: 5,
        }));
        assert!(err.is_transient());

        let err = MinutedError::Engine(EngineError::RoundLimit { max: 8 });
        assert!(!err.is_transient());
    }

    #[test]
    fn test_broadcast_error_never_transient() {
        let err = MinutedError::Broadcast(BroadcastError::Publish {
            chat_id: uuid::Uuid::new_v4(),
            message: "channel closed".into(),
        });
        assert!(!err.is_transient());
    }

    #[test]
    fn test_store_error_from_rusqlite() {
        let err: StoreError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, StoreError::Database { .. }));
    }
}
