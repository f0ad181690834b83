//! Response orchestrator — runs one chat turn end to end.
//!
//! A turn starts after the user's message is persisted: the orchestrator
//! clears poisoned state left by a previous failure, builds instructions
//! (with retrieved transcript context for meeting chats), drives the
//! completion engine, and publishes progress to the broadcast sink under a
//! strict ordering contract: per visible message exactly one created event,
//! throttled content replacements, one finalized event.
//!
//! Failures always leave the UI in a terminal state - a repaired message
//! carrying the apology text, or a standalone error notice - and only
//! transient provider errors escape so the queue can retry the turn.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broadcast::{Broadcaster, ChatEvent, strip_internal_tags};
use crate::config::{PublishConfig, RetrieverConfig};
use crate::engine::CompletionEngine;
use crate::error::{EngineError, MinutedError, Result};
use crate::prompts::PromptConfig;
use crate::retriever;
use crate::store::{ConversationStore, TranscriptStore};
use crate::types::{Chat, ChatMessage, Role, RoundEvent, TranscriptStatus};

/// Per-turn streaming state. Owned by one `respond` invocation, never shared
/// across turns.
#[derive(Default)]
struct TurnState {
    current_message_id: Option<Uuid>,
    accumulated: String,
    last_publish: Option<Instant>,
    placeholder_removed: bool,
    any_visible: bool,
}

/// Coordinates retrieval, the engine, and the broadcast sink for one chat.
pub struct ResponseOrchestrator {
    store: Arc<dyn ConversationStore>,
    transcripts: Arc<dyn TranscriptStore>,
    engine: Arc<CompletionEngine>,
    broadcaster: Arc<dyn Broadcaster>,
    prompts: PromptConfig,
    publish_interval: Duration,
    chunk_limit: usize,
}

impl ResponseOrchestrator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        transcripts: Arc<dyn TranscriptStore>,
        engine: Arc<CompletionEngine>,
        broadcaster: Arc<dyn Broadcaster>,
        prompts: PromptConfig,
        publish: &PublishConfig,
        retriever: &RetrieverConfig,
    ) -> Self {
        Self {
            store,
            transcripts,
            engine,
            broadcaster,
            prompts,
            publish_interval: Duration::from_millis(publish.interval_ms),
            chunk_limit: retriever.chunk_limit,
        }
    }

    /// Persist a user message synchronously, so callers can render it
    /// immediately before the background turn is enqueued.
    pub fn create_user_message(&self, chat_id: Uuid, content: &str) -> Result<ChatMessage> {
        let message = ChatMessage::user(chat_id, content);
        self.store.create_message(&message)?;
        Ok(message)
    }

    /// Run one turn for `chat_id`.
    pub async fn respond(&self, chat_id: Uuid) -> Result<()> {
        self.respond_cancellable(chat_id, CancellationToken::new())
            .await
    }

    /// Run one turn, stopping all publishing once `cancel` fires (e.g. the
    /// chat was deleted mid-turn).
    pub async fn respond_cancellable(
        &self,
        chat_id: Uuid,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut state = TurnState::default();
        match self.run_turn(chat_id, &cancel, &mut state).await {
            Ok(()) => Ok(()),
            Err(err) => self.recover(chat_id, &cancel, &mut state, err),
        }
    }

    async fn run_turn(
        &self,
        chat_id: Uuid,
        cancel: &CancellationToken,
        state: &mut TurnState,
    ) -> Result<()> {
        // --- Setup phase ---
        let removed = self.store.delete_blank_assistant_messages(chat_id)?;
        if removed > 0 {
            debug!(chat_id = %chat_id, removed, "Cleared poisoned assistant messages");
        }

        let chat = self.store.chat(chat_id)?;
        let instructions = self.build_instructions(&chat)?;
        self.store.replace_system_message(chat_id, &instructions)?;

        // --- Streaming phase ---
        let (tx, mut rx) = mpsc::channel(64);
        let engine = Arc::clone(&self.engine);
        let engine_task =
            tokio::spawn(async move { engine.run_turn(chat_id, &instructions, tx).await });

        while let Some(event) = rx.recv().await {
            if cancel.is_cancelled() {
                info!(chat_id = %chat_id, "Turn cancelled, stopping publishes");
                break;
            }
            match event {
                RoundEvent::NewMessage { message_id, role } => {
                    self.on_new_message(chat_id, state, message_id, role)?;
                }
                RoundEvent::ContentChunk(text) => {
                    self.on_content_chunk(chat_id, state, &text);
                }
                RoundEvent::RoundComplete => {}
            }
        }
        // Dropping the receiver tells the engine to stop if it is still
        // producing (the cancelled case).
        drop(rx);

        let engine_result = engine_task.await.map_err(|e| {
            MinutedError::Engine(EngineError::TaskFailed {
                message: format!("engine task panicked: {e}"),
            })
        })?;
        engine_result.map_err(MinutedError::Engine)?;

        if cancel.is_cancelled() {
            return Ok(());
        }

        // --- End of stream ---
        if let Some(message_id) = state.current_message_id.take() {
            self.finalize(chat_id, state, message_id)?;
        } else if !state.any_visible {
            // A turn with no visible content at all still reaches a terminal
            // UI state, synthesized from the last assistant message on record.
            if let Some(mut message) = self.store.last_assistant_message(chat_id)? {
                message.content = strip_internal_tags(&message.content);
                self.remove_placeholder_once(chat_id, state);
                self.publish(
                    chat_id,
                    ChatEvent::MessageCreated {
                        message: message.clone(),
                    },
                );
                self.publish(chat_id, ChatEvent::MessageFinalized { message });
            }
        }

        Ok(())
    }

    /// Build this turn's instructions and retrieve RAG context if the chat is
    /// meeting-scoped.
    fn build_instructions(&self, chat: &Chat) -> Result<String> {
        let today = chrono::Utc::now().date_naive();

        let Some(meeting_id) = chat.meeting_id else {
            return Ok(self.prompts.assistant_instructions(today));
        };
        let Some(meeting) = self.store.meeting(meeting_id)? else {
            warn!(chat_id = %chat.id, meeting_id = %meeting_id, "Chat references missing meeting");
            return Ok(self.prompts.assistant_instructions(today));
        };

        let context = self.retrieve_context(chat)?;
        Ok(self
            .prompts
            .meeting_instructions(&meeting, context.as_deref(), today))
    }

    /// The retrieved chunk block for the latest user message, or `None` while
    /// the transcript is not completed or has no chunks yet.
    fn retrieve_context(&self, chat: &Chat) -> Result<Option<String>> {
        let Some(meeting_id) = chat.meeting_id else {
            return Ok(None);
        };
        let Some(transcript) = self.transcripts.transcript_for_meeting(meeting_id)? else {
            return Ok(None);
        };
        if transcript.status != TranscriptStatus::Completed {
            return Ok(None);
        }
        let chunks = self.transcripts.chunks(transcript.id)?;
        if chunks.is_empty() {
            return Ok(None);
        }

        let query = self.store.latest_user_message(chat.id)?.map(|m| m.content);
        let selected = retriever::select(&chunks, query.as_deref(), self.chunk_limit);
        debug!(
            chat_id = %chat.id,
            selected = selected.len(),
            total = chunks.len(),
            "Retrieved transcript context"
        );
        Ok(Some(retriever::context_block(&selected)))
    }

    fn on_new_message(
        &self,
        chat_id: Uuid,
        state: &mut TurnState,
        message_id: Uuid,
        role: Role,
    ) -> Result<()> {
        // Finalize the previous message before tracking the next one, so two
        // messages are never mid-stream at once in the visible UI.
        if let Some(previous) = state.current_message_id.take() {
            self.finalize(chat_id, state, previous)?;
        }

        // Tool and system messages are never published; they only drive the
        // finalize-previous transition above.
        if role != Role::Assistant {
            return Ok(());
        }

        self.remove_placeholder_once(chat_id, state);

        let message = self.store.message(message_id)?;
        self.publish(chat_id, ChatEvent::MessageCreated { message });
        state.current_message_id = Some(message_id);
        state.accumulated.clear();
        state.last_publish = None;
        state.any_visible = true;
        Ok(())
    }

    fn on_content_chunk(&self, chat_id: Uuid, state: &mut TurnState, text: &str) {
        let Some(message_id) = state.current_message_id else {
            // Content for an untracked (tool) message is never published.
            return;
        };
        state.accumulated.push_str(text);

        let due = state
            .last_publish
            .is_none_or(|at| at.elapsed() >= self.publish_interval);
        if due {
            self.publish_content(chat_id, state, message_id);
        }
    }

    fn publish_content(&self, chat_id: Uuid, state: &mut TurnState, message_id: Uuid) {
        self.publish(
            chat_id,
            ChatEvent::MessageContent {
                message_id,
                content: strip_internal_tags(&state.accumulated),
            },
        );
        state.last_publish = Some(Instant::now());
    }

    /// Flush pending content unconditionally, re-read the persisted message,
    /// and publish its terminal event.
    fn finalize(&self, chat_id: Uuid, state: &mut TurnState, message_id: Uuid) -> Result<()> {
        self.publish_content(chat_id, state, message_id);
        let mut message = self.store.message(message_id)?;
        message.content = strip_internal_tags(&message.content);
        self.publish(chat_id, ChatEvent::MessageFinalized { message });
        state.accumulated.clear();
        state.last_publish = None;
        Ok(())
    }

    fn remove_placeholder_once(&self, chat_id: Uuid, state: &mut TurnState) {
        if !state.placeholder_removed {
            self.publish(chat_id, ChatEvent::ThinkingRemoved);
            state.placeholder_removed = true;
        }
    }

    /// Publish one event, swallowing sink failures: a broadcast problem must
    /// never take the turn down with it.
    fn publish(&self, chat_id: Uuid, event: ChatEvent) {
        if let Err(e) = self.broadcaster.publish(chat_id, event) {
            warn!(chat_id = %chat_id, error = %e, "Broadcast publish failed");
        }
    }

    // --- Failure phase ---

    /// Repair state after a failed turn, then re-raise only transient
    /// provider errors so the queue can retry with backoff.
    fn recover(
        &self,
        chat_id: Uuid,
        cancel: &CancellationToken,
        state: &mut TurnState,
        err: MinutedError,
    ) -> Result<()> {
        error!(chat_id = %chat_id, error = %err, "Turn failed");

        if !cancel.is_cancelled()
            && let Err(report_err) = self.report_failure(chat_id, state)
        {
            // A failure to report a failure must not crash the worker.
            error!(
                chat_id = %chat_id,
                error = %report_err,
                "Failed to publish turn failure"
            );
        }

        if err.is_transient() {
            return Err(err);
        }
        Ok(())
    }

    /// Put the UI into a terminal state: overwrite the affected message with
    /// the apology text, or publish a standalone notice when no message
    /// exists to repair.
    fn report_failure(&self, chat_id: Uuid, state: &mut TurnState) -> Result<()> {
        // The message being tracked, or - when the failure predates any
        // engine event - the most recent blank assistant message.
        let target = match state.current_message_id.take() {
            Some(id) => Some(self.store.message(id)?),
            None => self.store.latest_blank_assistant_message(chat_id)?,
        };

        self.remove_placeholder_once(chat_id, state);

        match target {
            Some(mut message) => {
                // Tool calls stay attached so their results are not orphaned.
                self.store.update_message(
                    message.id,
                    &self.prompts.apology,
                    &message.tool_calls,
                )?;
                message.content = self.prompts.apology.clone();
                self.publish(
                    chat_id,
                    ChatEvent::MessageCreated {
                        message: message.clone(),
                    },
                );
                self.publish(chat_id, ChatEvent::MessageFinalized { message });
            }
            None => {
                self.publish(
                    chat_id,
                    ChatEvent::ErrorNotice {
                        text: self.prompts.apology.clone(),
                    },
                );
            }
        }
        Ok(())
    }
}
