//! # Minuted Core
//!
//! Core library for the Minuted meeting assistant: transcript chunking and
//! retrieval, the streaming response orchestrator, LLM providers, the
//! broadcast sink, and the turn queue.

pub mod broadcast;
pub mod chunker;
pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod queue;
pub mod retriever;
pub mod store;
pub mod types;

// Re-export commonly used types at the crate root.
pub use broadcast::{Broadcaster, ChannelBroadcaster, ChatEvent, RecordingBroadcaster};
pub use config::{AppConfig, load_config};
pub use engine::{CompletionEngine, LlmProvider, MockProvider, MockRound, ToolExecutor};
pub use error::{MinutedError, Result};
pub use orchestrator::ResponseOrchestrator;
pub use prompts::PromptConfig;
pub use queue::TurnQueue;
pub use store::{MemoryStore, SqliteStore};
pub use types::{
    Chat, ChatMessage, Chunk, CompletionRequest, Meeting, Role, RoundEvent, Segment, StreamEvent,
    TokenUsage, ToolCall, ToolDefinition, TranscriptStatus,
};
