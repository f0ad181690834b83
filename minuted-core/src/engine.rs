//! Completion engine — drives provider rounds for one turn.
//!
//! The engine owns the round loop: it builds each request from the stored
//! conversation, persists every message it creates (the orchestrator only
//! observes persisted state), executes requested tools, and feeds the next
//! round until the model answers in plain text or the round cap trips.
//!
//! Incremental output reaches the orchestrator as a sequence of
//! [`RoundEvent`]s over an mpsc channel; the provider's own stream is an
//! internal detail of each round.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{EngineConfig, LlmConfig};
use crate::error::{EngineError, LlmError, ToolError};
use crate::store::ConversationStore;
use crate::types::{
    ChatMessage, CompletionRequest, Role, RoundEvent, RoundOutcome, StreamEvent, TokenUsage,
    ToolCall, ToolDefinition,
};

/// Trait for LLM providers. One call = one round, streamed.
#[async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    /// Perform a streaming completion, sending events to the channel.
    /// Implementations must finish with `StreamEvent::Done` on success.
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// The calling contract between the engine and the tool registry.
///
/// Implemented by `minuted-tools`' registry; the engine holds an injected
/// executor rather than consulting any global registration state.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Definitions of every registered tool, passed to the provider on each
    /// round without per-turn filtering.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Execute a tool by name. Errors are reported, not panicked.
    async fn execute(&self, name: &str, args: serde_json::Value) -> Result<String, ToolError>;
}

/// An empty tool set, for chats that run without tools.
pub struct NoTools;

#[async_trait]
impl ToolExecutor for NoTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    async fn execute(&self, name: &str, _args: serde_json::Value) -> Result<String, ToolError> {
        Err(ToolError::NotFound {
            name: name.to_string(),
        })
    }
}

/// Drives a provider through the rounds of one turn.
pub struct CompletionEngine {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<dyn ToolExecutor>,
    store: Arc<dyn ConversationStore>,
    temperature: f32,
    max_tokens: Option<usize>,
    max_rounds: usize,
}

impl CompletionEngine {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<dyn ToolExecutor>,
        store: Arc<dyn ConversationStore>,
        llm: &LlmConfig,
        engine: &EngineConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            store,
            temperature: llm.temperature,
            max_tokens: Some(llm.max_tokens),
            max_rounds: engine.max_rounds,
        }
    }

    /// Run all rounds of one turn for `chat_id`.
    ///
    /// Emits `RoundEvent`s on `events`; a closed receiver means the consumer
    /// stopped listening (turn cancelled), which ends the turn quietly.
    pub async fn run_turn(
        &self,
        chat_id: Uuid,
        instructions: &str,
        events: mpsc::Sender<RoundEvent>,
    ) -> Result<(), EngineError> {
        let tool_definitions = self.tools.definitions();
        let mut total_usage = TokenUsage::default();

        for round in 1..=self.max_rounds {
            debug!(chat_id = %chat_id, round, "Starting completion round");

            let conversation: Vec<ChatMessage> = self
                .store
                .conversation(chat_id)?
                .into_iter()
                .filter(|m| m.role != Role::System)
                .collect();

            let request = CompletionRequest {
                instructions: instructions.to_string(),
                messages: conversation,
                tools: tool_definitions.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                model: None,
            };

            // The engine owns message existence: the row is created before
            // streaming starts and its final content is written at round end.
            let message = ChatMessage::assistant(chat_id, "");
            self.store.create_message(&message)?;
            if events
                .send(RoundEvent::NewMessage {
                    message_id: message.id,
                    role: Role::Assistant,
                })
                .await
                .is_err()
            {
                debug!(chat_id = %chat_id, "Event receiver dropped, ending turn");
                return Ok(());
            }

            let outcome = self.stream_round(request, &events).await?;
            total_usage.accumulate(&outcome.usage);

            self.store
                .update_message(message.id, &outcome.text, &outcome.tool_calls)?;
            let _ = events.send(RoundEvent::RoundComplete).await;

            if outcome.is_tool_only() {
                debug!(
                    chat_id = %chat_id,
                    calls = outcome.tool_calls.len(),
                    "Round produced tool calls only"
                );
            }

            if outcome.tool_calls.is_empty() {
                info!(
                    chat_id = %chat_id,
                    rounds = round,
                    input_tokens = total_usage.input_tokens,
                    output_tokens = total_usage.output_tokens,
                    "Turn completed"
                );
                return Ok(());
            }

            for call in &outcome.tool_calls {
                let output = match self.tools.execute(&call.name, call.arguments.clone()).await {
                    Ok(output) => output,
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "Tool execution failed");
                        format!("Tool error: {e}")
                    }
                };
                let tool_message = ChatMessage::tool_result(chat_id, &call.id, output);
                self.store.create_message(&tool_message)?;
                if events
                    .send(RoundEvent::NewMessage {
                        message_id: tool_message.id,
                        role: Role::Tool,
                    })
                    .await
                    .is_err()
                {
                    debug!(chat_id = %chat_id, "Event receiver dropped, ending turn");
                    return Ok(());
                }
            }
        }

        Err(EngineError::RoundLimit {
            max: self.max_rounds,
        })
    }

    /// Stream one provider round, forwarding text as `ContentChunk`s and
    /// assembling the round's final text and tool calls.
    async fn stream_round(
        &self,
        request: CompletionRequest,
        events: &mpsc::Sender<RoundEvent>,
    ) -> Result<RoundOutcome, EngineError> {
        let (tx, mut rx) = mpsc::channel(64);

        // Producer and consumer must run concurrently: awaiting the provider
        // before draining the channel would deadlock once it fills.
        let provider = Arc::clone(&self.provider);
        let producer =
            tokio::spawn(async move { provider.complete_streaming(request, tx).await });

        let mut text = String::new();
        let mut usage = TokenUsage::default();
        // (id, name, accumulated argument json), in arrival order.
        let mut calls: Vec<(String, String, String)> = Vec::new();

        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Token(token) => {
                    let _ = events.send(RoundEvent::ContentChunk(token.clone())).await;
                    text.push_str(&token);
                }
                StreamEvent::ToolCallStart { id, name } => {
                    calls.push((id, name, String::new()));
                }
                StreamEvent::ToolCallDelta {
                    id,
                    arguments_delta,
                } => {
                    if let Some((_, _, args)) = calls.iter_mut().find(|(cid, _, _)| *cid == id) {
                        args.push_str(&arguments_delta);
                    }
                }
                StreamEvent::ToolCallEnd { .. } => {}
                StreamEvent::Done { usage: u } => {
                    usage = u;
                    break;
                }
                StreamEvent::Error(message) => {
                    return Err(EngineError::Provider(LlmError::Streaming { message }));
                }
            }
        }

        producer
            .await
            .map_err(|e| EngineError::TaskFailed {
                message: format!("streaming task panicked: {e}"),
            })?
            .map_err(EngineError::Provider)?;

        let tool_calls: Vec<ToolCall> = calls
            .into_iter()
            .map(|(id, name, args)| ToolCall {
                id,
                name,
                arguments: serde_json::from_str(&args).unwrap_or(serde_json::json!({})),
            })
            .collect();

        Ok(RoundOutcome {
            text,
            tool_calls,
            usage,
        })
    }
}

/// One scripted provider round for [`MockProvider`].
pub enum MockRound {
    /// Send these events, append `Done`, and return Ok.
    Stream(Vec<StreamEvent>),
    /// Send these events, then fail with the error (no `Done`).
    StreamThenFail(Vec<StreamEvent>, LlmError),
}

impl MockRound {
    /// A round producing the given text fragments.
    pub fn text(fragments: &[&str]) -> Self {
        MockRound::Stream(
            fragments
                .iter()
                .map(|t| StreamEvent::Token(t.to_string()))
                .collect(),
        )
    }

    /// A round requesting a single tool call, with no trailing text.
    pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        MockRound::Stream(vec![
            StreamEvent::ToolCallStart {
                id: id.to_string(),
                name: name.to_string(),
            },
            StreamEvent::ToolCallDelta {
                id: id.to_string(),
                arguments_delta: arguments.to_string(),
            },
            StreamEvent::ToolCallEnd { id: id.to_string() },
        ])
    }

    /// A round that fails immediately with the given error.
    pub fn fail(error: LlmError) -> Self {
        MockRound::StreamThenFail(Vec::new(), error)
    }
}

/// A scripted provider for tests: each `complete_streaming` call pops the
/// next round from the queue.
pub struct MockProvider {
    script: std::sync::Mutex<VecDeque<MockRound>>,
}

impl MockProvider {
    pub fn new(rounds: Vec<MockRound>) -> Self {
        Self {
            script: std::sync::Mutex::new(rounds.into_iter().collect()),
        }
    }
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn complete_streaming(
        &self,
        _request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError> {
        let round = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match round {
            Some(MockRound::Stream(events)) => {
                for event in events {
                    let _ = tx.send(event).await;
                }
                let _ = tx
                    .send(StreamEvent::Done {
                        usage: TokenUsage {
                            input_tokens: 100,
                            output_tokens: 50,
                        },
                    })
                    .await;
                Ok(())
            }
            Some(MockRound::StreamThenFail(events, error)) => {
                for event in events {
                    let _ = tx.send(event).await;
                }
                Err(error)
            }
            None => {
                let _ = tx
                    .send(StreamEvent::Token(
                        "Mock provider has no scripted rounds left.".to_string(),
                    ))
                    .await;
                let _ = tx
                    .send(StreamEvent::Done {
                        usage: TokenUsage::default(),
                    })
                    .await;
                Ok(())
            }
        }
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}
