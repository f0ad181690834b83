//! OpenAI-compatible LLM provider.
//!
//! Supports OpenAI, Azure OpenAI, Ollama, vLLM, and any endpoint that
//! follows the OpenAI chat completions API format.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::LlmConfig;
use crate::engine::LlmProvider;
use crate::error::LlmError;
use crate::types::{ChatMessage, CompletionRequest, Role, StreamEvent, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat-completions provider.
#[derive(Debug)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatibleProvider {
    /// Create a new provider from configuration.
    ///
    /// Local endpoints (localhost base URLs) don't require an API key; a
    /// dummy bearer token is used so Ollama-style servers accept the request.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let is_local = config
            .base_url
            .as_ref()
            .map(|u| u.contains("localhost") || u.contains("127.0.0.1"))
            .unwrap_or(false);

        let api_key = match super::resolve_api_key(config) {
            Ok(key) => key,
            Err(_) if is_local => {
                debug!("No API key set for local provider; using dummy bearer token");
                "local".to_string()
            }
            Err(e) => return Err(e),
        };

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

    fn build_request_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let mut messages: Vec<Value> = Vec::with_capacity(request.messages.len() + 1);
        if !request.instructions.is_empty() {
            messages.push(json!({"role": "system", "content": request.instructions}));
        }
        messages.extend(
            request
                .messages
                .iter()
                .filter(|m| m.role != Role::System)
                .map(Self::message_to_json),
        );

        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": messages,
            "temperature": request.temperature,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = json!({ "include_usage": true });
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }

        body
    }

    /// Convert one stored message to OpenAI's message format.
    fn message_to_json(msg: &ChatMessage) -> Value {
        match msg.role {
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": msg.tool_call_id.as_deref().unwrap_or(""),
                "content": msg.content,
            }),
            Role::Assistant if !msg.tool_calls.is_empty() => {
                let calls: Vec<Value> = msg
                    .tool_calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": {
                                "name": c.name,
                                "arguments": c.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                json!({
                    "role": "assistant",
                    "content": if msg.content.is_empty() { Value::Null } else { Value::String(msg.content.clone()) },
                    "tool_calls": calls,
                })
            }
            Role::Assistant => json!({"role": "assistant", "content": msg.content}),
            _ => json!({"role": "user", "content": msg.content}),
        }
    }

    /// Map an HTTP status code to the appropriate LlmError.
    fn map_http_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        match status.as_u16() {
            401 => LlmError::AuthFailed {
                provider: "OpenAI-compatible".to_string(),
            },
            429 => {
                // "Rate limit... try again in Xs" in the error message.
                let retry_secs = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| v["error"]["message"].as_str().map(String::from))
                    .and_then(|msg| {
                        msg.rsplit("in ")
                            .next()
                            .and_then(|s| s.trim_end_matches('s').parse::<u64>().ok())
                    })
                    .unwrap_or(5);
                LlmError::RateLimited {
                    retry_after_secs: retry_secs,
                }
            }
            status if status >= 500 => LlmError::Connection {
                message: format!("server error ({status}): {body}"),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {status}: {body}"),
            },
        }
    }

    fn parse_sse_line(line: &str) -> Option<Value> {
        let data = line.strip_prefix("data: ")?;
        if data == "[DONE]" {
            return None;
        }
        serde_json::from_str(data).ok()
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request_body(&request, true);

        debug!(model = %self.model, url = %url, "Sending OpenAI-compatible streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Connection {
                message: format!("streaming request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body_text));
        }

        let full_body = response.text().await.map_err(|e| LlmError::Streaming {
            message: format!("failed to read stream: {e}"),
        })?;

        let mut usage = TokenUsage::default();
        // Streaming tool calls arrive keyed by index, with the id only on
        // the first delta.
        let mut active_tool_calls: HashMap<usize, String> = HashMap::new();

        for line in full_body.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if line == "data: [DONE]" {
                break;
            }
            let Some(data) = Self::parse_sse_line(line) else {
                continue;
            };

            if let Some(u) = data.get("usage") {
                usage.input_tokens = u["prompt_tokens"].as_u64().unwrap_or(0) as usize;
                usage.output_tokens = u["completion_tokens"].as_u64().unwrap_or(0) as usize;
            }

            let Some(choice) = data["choices"].get(0) else {
                continue;
            };
            let delta = &choice["delta"];

            if let Some(content) = delta["content"].as_str()
                && !content.is_empty()
            {
                let _ = tx.send(StreamEvent::Token(content.to_string())).await;
            }

            if let Some(tool_calls) = delta["tool_calls"].as_array() {
                for tc in tool_calls {
                    let index = tc["index"].as_u64().unwrap_or(0) as usize;
                    let func = &tc["function"];

                    if let Some(name) = func["name"].as_str() {
                        let id = tc["id"].as_str().unwrap_or("").to_string();
                        active_tool_calls.insert(index, id.clone());
                        let _ = tx
                            .send(StreamEvent::ToolCallStart {
                                id,
                                name: name.to_string(),
                            })
                            .await;
                    }
                    if let Some(args) = func["arguments"].as_str()
                        && !args.is_empty()
                        && let Some(id) = active_tool_calls.get(&index)
                    {
                        let _ = tx
                            .send(StreamEvent::ToolCallDelta {
                                id: id.clone(),
                                arguments_delta: args.to_string(),
                            })
                            .await;
                    }
                }
            }

            if choice["finish_reason"].as_str() == Some("tool_calls") {
                for (_, id) in active_tool_calls.drain() {
                    let _ = tx.send(StreamEvent::ToolCallEnd { id }).await;
                }
            }
        }

        let _ = tx.send(StreamEvent::Done { usage }).await;
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
