//! Core type definitions for the Minuted pipeline.
//!
//! Defines the fundamental data structures used throughout the system:
//! transcript segments and chunks, chat messages, tool calls, and the
//! event types exchanged with the completion engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a participant role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    /// Whether messages with this role are shown to the user.
    /// System and tool messages are internal and never published.
    pub fn is_visible(&self) -> bool {
        matches!(self, Role::User | Role::Assistant)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A single utterance in a meeting transcript.
///
/// Segments are produced once by the external transcription pipeline and are
/// immutable afterwards; `position` gives the total order within a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub speaker: String,
    pub text: String,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub position: i64,
}

impl Segment {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>, position: i64) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            start_time: None,
            end_time: None,
            position,
        }
    }

    pub fn with_times(mut self, start: f64, end: f64) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }
}

/// A contiguous, speaker-labeled span of transcript text bounded by a token
/// budget. Derived from segments and fully replaced whenever chunking reruns.
///
/// `embedding` mirrors the vector column of the original schema; it is an
/// extension point and nothing in the retriever reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub position: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Processing status of a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for TranscriptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptStatus::Pending => write!(f, "pending"),
            TranscriptStatus::Processing => write!(f, "processing"),
            TranscriptStatus::Completed => write!(f, "completed"),
            TranscriptStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TranscriptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TranscriptStatus::Pending),
            "processing" => Ok(TranscriptStatus::Processing),
            "completed" => Ok(TranscriptStatus::Completed),
            "failed" => Ok(TranscriptStatus::Failed),
            other => Err(format!("unknown transcript status: {other}")),
        }
    }
}

/// A meeting a chat can be scoped to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// A conversation. Meeting-scoped chats answer from transcript context (RAG
/// mode); standalone chats run as a cross-meeting tool agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub meeting_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A tool invocation requested by the model within an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A single message in a chat.
///
/// `content` is mutable for the lifetime of a streaming turn: the engine
/// creates the row empty, streams into it, and writes the final text when the
/// round completes. An assistant message left with empty content and no tool
/// calls after a turn is poisoned and gets deleted before the next turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For tool-role messages: the id of the call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(chat_id: Uuid, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            chat_id,
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn user(chat_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(chat_id, Role::User, content)
    }

    pub fn assistant(chat_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(chat_id, Role::Assistant, content)
    }

    pub fn system(chat_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(chat_id, Role::System, content)
    }

    /// A tool-result message answering `call_id`.
    pub fn tool_result(chat_id: Uuid, call_id: impl Into<String>, output: impl Into<String>) -> Self {
        let mut msg = Self::new(chat_id, Role::Tool, output);
        msg.tool_call_id = Some(call_id.into());
        msg
    }

    /// Whether this message is shown to the user.
    pub fn is_visible(&self) -> bool {
        self.role.is_visible()
    }

    /// A blank in-progress marker: no text and no tool calls. If one of these
    /// survives a turn it poisons subsequent provider calls.
    pub fn is_blank_assistant(&self) -> bool {
        self.role == Role::Assistant && self.content.is_empty() && self.tool_calls.is_empty()
    }
}

/// A definition describing a tool for the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Token usage statistics from a provider call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }

    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// A request to the provider for one round of completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System instructions, sent as the provider's system field.
    pub instructions: String,
    /// The conversation so far, excluding the system message.
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub model: Option<String>,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            instructions: String::new(),
            messages: Vec::new(),
            tools: Vec::new(),
            temperature: 0.3,
            max_tokens: None,
            model: None,
        }
    }
}

/// A stream event received from a provider during one round.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Token(String),
    ToolCallStart { id: String, name: String },
    ToolCallDelta { id: String, arguments_delta: String },
    ToolCallEnd { id: String },
    Done { usage: TokenUsage },
    Error(String),
}

/// The outcome of one provider round, assembled from its stream.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

impl RoundOutcome {
    /// A round that produced only tool calls, with no trailing text.
    pub fn is_tool_only(&self) -> bool {
        self.text.is_empty() && !self.tool_calls.is_empty()
    }
}

/// Events the completion engine emits to the orchestrator while a turn runs.
///
/// The engine persists message rows itself; `NewMessage` announces that a row
/// now exists and is current. Content chunks always belong to the most
/// recently announced message.
#[derive(Debug, Clone)]
pub enum RoundEvent {
    NewMessage { message_id: Uuid, role: Role },
    ContentChunk(String),
    RoundComplete,
}
