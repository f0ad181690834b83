//! Tool registry — manages tool registration, validation, and execution.
//!
//! Tools are registered at startup; the registry provides tool definitions
//! for the model and executes tool calls with timeout handling. It
//! implements the engine's `ToolExecutor` contract, so the whole registered
//! set is passed to every turn without per-turn filtering.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use minuted_core::engine::ToolExecutor;
use minuted_core::error::ToolError;
use minuted_core::types::ToolDefinition;
use tracing::{debug, info};

/// Trait that all tools must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// Human-readable description of what this tool does.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments, returning the text fed
    /// back to the model.
    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError>;

    /// Maximum execution time before timeout.
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}

/// Holds all registered tools and handles execution.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool. Returns an error if the name is already taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered { name });
        }
        debug!(tool = %name, "Registering tool");
        self.order.push(name.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, in registration order.
    pub fn list_names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    async fn execute(&self, name: &str, args: serde_json::Value) -> Result<String, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
        })?;

        let timeout = tool.timeout();
        info!(tool = %name, timeout_secs = timeout.as_secs(), "Executing tool");

        match tokio::time::timeout(timeout, tool.execute(args)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                name: name.to_string(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

/// Extract a required string argument.
pub(crate) fn require_str<'a>(
    args: &'a serde_json::Value,
    key: &str,
    tool: &str,
) -> Result<&'a str, ToolError> {
    args[key].as_str().ok_or_else(|| ToolError::InvalidArguments {
        name: tool.to_string(),
        reason: format!("missing '{key}' parameter"),
    })
}

/// Extract an optional non-empty string argument.
pub(crate) fn optional_str<'a>(args: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    args[key].as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// Extract an optional positive integer argument, with a default.
pub(crate) fn limit_arg(args: &serde_json::Value, default: usize) -> usize {
    args["limit"]
        .as_u64()
        .map(|n| n as usize)
        .filter(|n| *n > 0)
        .unwrap_or(default)
}

/// Parse a required meeting/item id argument as a UUID.
pub(crate) fn require_uuid(
    args: &serde_json::Value,
    key: &str,
    tool: &str,
) -> Result<uuid::Uuid, ToolError> {
    let raw = require_str(args, key, tool)?;
    uuid::Uuid::parse_str(raw).map_err(|_| ToolError::InvalidArguments {
        name: tool.to_string(),
        reason: format!("'{key}' is not a valid id: {raw}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes the input text back"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "Text to echo" }
                },
                "required": ["text"]
            })
        }

        async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
            let text = require_str(&args, "text", "echo")?;
            Ok(format!("Echo: {text}"))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "A tool that takes forever"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }

        async fn execute(&self, _args: serde_json::Value) -> Result<String, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("done".into())
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(50)
        }
    }

    #[test]
    fn test_register_and_list() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.get("echo").is_some());

        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }

    #[test]
    fn test_register_duplicate() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        match registry.register(Arc::new(EchoTool)) {
            Err(ToolError::AlreadyRegistered { name }) => assert_eq!(name, "echo"),
            other => panic!("expected AlreadyRegistered, got {other:?}"),
        }
    }

    #[test]
    fn test_definitions_preserve_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SlowTool)).unwrap();
        registry.register(Arc::new(EchoTool)).unwrap();
        let names: Vec<String> = registry.definitions().iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["slow", "echo"]);
    }

    #[tokio::test]
    async fn test_execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();

        let result = registry
            .execute("echo", serde_json::json!({"text": "hello"}))
            .await
            .unwrap();
        assert_eq!(result, "Echo: hello");
    }

    #[tokio::test]
    async fn test_execute_nonexistent_tool() {
        let registry = ToolRegistry::new();
        let result = registry.execute("missing", serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_execute_invalid_args() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        let result = registry.execute("echo", serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments { .. })));
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SlowTool)).unwrap();
        let result = registry.execute("slow", serde_json::json!({})).await;
        match result {
            Err(ToolError::Timeout { name, .. }) => assert_eq!(name, "slow"),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_arg_helpers() {
        let args = serde_json::json!({"name": "Priya", "empty": "  ", "limit": 5});
        assert_eq!(require_str(&args, "name", "t").unwrap(), "Priya");
        assert!(require_str(&args, "missing", "t").is_err());
        assert_eq!(optional_str(&args, "name"), Some("Priya"));
        assert_eq!(optional_str(&args, "empty"), None);
        assert_eq!(optional_str(&args, "missing"), None);
        assert_eq!(limit_arg(&args, 10), 5);
        assert_eq!(limit_arg(&serde_json::json!({}), 10), 10);
    }
}
