//! Anthropic Messages API provider implementation.
//!
//! Implements the `LlmProvider` trait for the native Anthropic Messages API.
//!
//! Key differences from OpenAI-compatible APIs:
//! - Auth via `x-api-key` header (not `Authorization: Bearer`)
//! - Required `anthropic-version` header
//! - Instructions are a top-level `system` field, not a message
//! - Tool calls use `tool_use` / `tool_result` content block conventions
//! - SSE streaming uses Anthropic-specific event types

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::engine::LlmProvider;
use crate::error::LlmError;
use crate::types::{ChatMessage, CompletionRequest, Role, StreamEvent, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// The required Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider.
#[derive(Debug)]
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider from configuration.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`; returns `LlmError::AuthFailed` if it is unset.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = super::resolve_api_key(config)?;
        Ok(Self {
            client: Client::new(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
        })
    }

    /// Build the JSON request body for the Messages API.
    fn build_request_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(Self::message_to_json)
            .collect();

        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "max_tokens": request.max_tokens.unwrap_or(4096),
            "temperature": request.temperature,
            "messages": messages,
        });

        if !request.instructions.is_empty() {
            body["system"] = Value::String(request.instructions.clone());
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }

        if stream {
            body["stream"] = Value::Bool(true);
        }

        body
    }

    /// Convert one stored message to Anthropic's message format.
    fn message_to_json(msg: &ChatMessage) -> Value {
        match msg.role {
            Role::Tool => {
                // Tool results travel as user-role tool_result blocks.
                json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": msg.tool_call_id.as_deref().unwrap_or(""),
                        "content": msg.content,
                    }]
                })
            }
            Role::Assistant if !msg.tool_calls.is_empty() => {
                let mut blocks: Vec<Value> = Vec::new();
                if !msg.content.is_empty() {
                    blocks.push(json!({"type": "text", "text": msg.content}));
                }
                for call in &msg.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                json!({"role": "assistant", "content": blocks})
            }
            Role::Assistant => json!({"role": "assistant", "content": msg.content}),
            _ => json!({"role": "user", "content": msg.content}),
        }
    }

    /// Map an HTTP status code to the appropriate LlmError.
    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> LlmError {
        match status.as_u16() {
            401 => LlmError::AuthFailed {
                provider: "Anthropic".to_string(),
            },
            429 => {
                let retry_after = serde_json::from_str::<Value>(body_text)
                    .ok()
                    .and_then(|v| v["error"]["retry_after_secs"].as_u64())
                    .unwrap_or(30);
                LlmError::RateLimited {
                    retry_after_secs: retry_after,
                }
            }
            status if status >= 500 => LlmError::Connection {
                message: format!("server error ({status}): {body_text}"),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {status} from Anthropic API: {body_text}"),
            },
        }
    }

    /// Process one parsed SSE event, sending the matching `StreamEvent`.
    ///
    /// Tracks the current content block id and type for correlating deltas
    /// with their tool calls. Returns output-token usage when the event
    /// carries it.
    async fn process_sse_event(
        event_type: &str,
        data: &Value,
        tx: &mpsc::Sender<StreamEvent>,
        current_block_id: &mut Option<String>,
        current_block_type: &mut Option<String>,
    ) -> Result<Option<TokenUsage>, LlmError> {
        match event_type {
            "content_block_start" => {
                let content_block = &data["content_block"];
                let block_type = content_block["type"].as_str().unwrap_or("").to_string();
                *current_block_type = Some(block_type.clone());

                if block_type == "tool_use" {
                    let id = content_block["id"].as_str().unwrap_or("").to_string();
                    let name = content_block["name"].as_str().unwrap_or("").to_string();
                    *current_block_id = Some(id.clone());
                    let _ = tx.send(StreamEvent::ToolCallStart { id, name }).await;
                }
                Ok(None)
            }
            "content_block_delta" => {
                let delta = &data["delta"];
                match delta["type"].as_str().unwrap_or("") {
                    "text_delta" => {
                        let text = delta["text"].as_str().unwrap_or("").to_string();
                        if !text.is_empty() {
                            let _ = tx.send(StreamEvent::Token(text)).await;
                        }
                    }
                    "input_json_delta" => {
                        let partial = delta["partial_json"].as_str().unwrap_or("").to_string();
                        if let Some(id) = current_block_id.as_ref() {
                            let _ = tx
                                .send(StreamEvent::ToolCallDelta {
                                    id: id.clone(),
                                    arguments_delta: partial,
                                })
                                .await;
                        }
                    }
                    other => {
                        debug!(delta_type = other, "Ignoring unknown delta type in stream");
                    }
                }
                Ok(None)
            }
            "content_block_stop" => {
                if current_block_type.as_deref() == Some("tool_use")
                    && let Some(id) = current_block_id.take()
                {
                    let _ = tx.send(StreamEvent::ToolCallEnd { id }).await;
                }
                *current_block_type = None;
                Ok(None)
            }
            "message_delta" => {
                let output_tokens = data["usage"]["output_tokens"].as_u64().unwrap_or(0) as usize;
                Ok(Some(TokenUsage {
                    input_tokens: 0,
                    output_tokens,
                }))
            }
            "error" => {
                let message = data["error"]["message"]
                    .as_str()
                    .unwrap_or("Unknown streaming error")
                    .to_string();
                let _ = tx.send(StreamEvent::Error(message.clone())).await;
                Err(LlmError::Streaming { message })
            }
            // message_start usage is handled by the caller; ping is keepalive.
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError> {
        let body = self.build_request_body(&request, true);
        let url = format!("{}/messages", self.base_url);

        debug!(model = %self.model, url = %url, "Sending Anthropic streaming request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Connection {
                message: format!("streaming request to Anthropic API failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body_text));
        }

        let body_text = response.text().await.map_err(|e| LlmError::Streaming {
            message: format!("failed to read streaming response: {e}"),
        })?;

        let mut current_block_id: Option<String> = None;
        let mut current_block_type: Option<String> = None;
        let mut total_usage = TokenUsage::default();
        let mut current_event_type = String::new();

        // SSE format: "event:" and "data:" lines separated by blank lines.
        for line in body_text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(event_value) = line.strip_prefix("event: ") {
                current_event_type = event_value.trim().to_string();
            } else if let Some(data_value) = line.strip_prefix("data: ") {
                let Ok(data) = serde_json::from_str::<Value>(data_value.trim()) else {
                    warn!("Skipping unparseable SSE data line");
                    continue;
                };

                if current_event_type == "message_start"
                    && let Some(input_tokens) =
                        data["message"]["usage"]["input_tokens"].as_u64()
                {
                    total_usage.input_tokens = input_tokens as usize;
                }

                if let Some(partial) = Self::process_sse_event(
                    &current_event_type,
                    &data,
                    &tx,
                    &mut current_block_id,
                    &mut current_block_type,
                )
                .await?
                {
                    total_usage.output_tokens += partial.output_tokens;
                }

                current_event_type.clear();
            }
        }

        let _ = tx.send(StreamEvent::Done { usage: total_usage }).await;
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
