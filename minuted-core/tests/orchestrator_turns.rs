//! End-to-end turn tests: the orchestrator driving a scripted provider
//! through the engine, with the in-memory store and a recording broadcaster.

use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use minuted_core::broadcast::{ChatEvent, RecordingBroadcaster};
use minuted_core::config::{EngineConfig, LlmConfig, PublishConfig, QueueConfig, RetrieverConfig};
use minuted_core::queue::TurnQueue;
use minuted_core::engine::{CompletionEngine, MockProvider, MockRound, NoTools, ToolExecutor};
use minuted_core::error::{LlmError, ToolError};
use minuted_core::orchestrator::ResponseOrchestrator;
use minuted_core::prompts::PromptConfig;
use minuted_core::store::{ConversationStore, MemoryStore, TranscriptStore};
use minuted_core::types::{ChatMessage, Role, Segment, ToolDefinition, TranscriptStatus};

struct LookupTool;

#[async_trait]
impl ToolExecutor for LookupTool {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "contact_lookup".into(),
            description: "Look up a contact".into(),
            parameters: serde_json::json!({"type": "object"}),
        }]
    }

    async fn execute(&self, name: &str, _args: serde_json::Value) -> Result<String, ToolError> {
        match name {
            "contact_lookup" => Ok("Priya Shah <priya@example.com>".into()),
            other => Err(ToolError::NotFound { name: other.into() }),
        }
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    broadcaster: Arc<RecordingBroadcaster>,
    orchestrator: ResponseOrchestrator,
}

fn harness_with_interval(
    rounds: Vec<MockRound>,
    tools: Arc<dyn ToolExecutor>,
    interval_ms: u64,
) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let broadcaster = Arc::new(RecordingBroadcaster::new());
    let engine = Arc::new(CompletionEngine::new(
        Arc::new(MockProvider::new(rounds)),
        tools,
        Arc::clone(&store) as Arc<dyn ConversationStore>,
        &LlmConfig::default(),
        &EngineConfig::default(),
    ));
    let orchestrator = ResponseOrchestrator::new(
        Arc::clone(&store) as Arc<dyn ConversationStore>,
        Arc::clone(&store) as Arc<dyn TranscriptStore>,
        engine,
        Arc::clone(&broadcaster) as Arc<dyn minuted_core::broadcast::Broadcaster>,
        PromptConfig::default(),
        &PublishConfig { interval_ms },
        &RetrieverConfig::default(),
    );
    Harness {
        store,
        broadcaster,
        orchestrator,
    }
}

fn harness(rounds: Vec<MockRound>, tools: Arc<dyn ToolExecutor>) -> Harness {
    // Zero interval so every chunk publishes; throttling has its own test.
    harness_with_interval(rounds, tools, 0)
}

/// The ordered event sequences per visible message id, plus standalone events.
fn sequences(events: &[ChatEvent]) -> std::collections::HashMap<Uuid, Vec<&'static str>> {
    let mut map: std::collections::HashMap<Uuid, Vec<&'static str>> = Default::default();
    for event in events {
        match event {
            ChatEvent::MessageCreated { message } => {
                map.entry(message.id).or_default().push("created")
            }
            ChatEvent::MessageContent { message_id, .. } => {
                map.entry(*message_id).or_default().push("content")
            }
            ChatEvent::MessageFinalized { message } => {
                map.entry(message.id).or_default().push("finalized")
            }
            _ => {}
        }
    }
    map
}

#[tokio::test]
async fn single_round_event_ordering() {
    let h = harness(
        vec![MockRound::text(&["The ", "deadline ", "moved."])],
        Arc::new(NoTools),
    );
    let chat = h.store.create_chat(None).unwrap();
    h.orchestrator
        .create_user_message(chat.id, "what happened to the deadline?")
        .unwrap();

    h.orchestrator.respond(chat.id).await.unwrap();

    let events = h.broadcaster.events_for(chat.id);

    // The placeholder is removed exactly once, before the created event.
    let removed: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, ChatEvent::ThinkingRemoved))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(removed.len(), 1);
    let created_at = events
        .iter()
        .position(|e| matches!(e, ChatEvent::MessageCreated { .. }))
        .unwrap();
    assert!(removed[0] < created_at);

    // Exactly one created, >= 1 content replace, exactly one finalized.
    let seqs = sequences(&events);
    assert_eq!(seqs.len(), 1);
    let seq = seqs.values().next().unwrap();
    assert_eq!(seq.first(), Some(&"created"));
    assert_eq!(seq.last(), Some(&"finalized"));
    assert!(seq.iter().filter(|s| **s == "content").count() >= 1);
    assert_eq!(seq.iter().filter(|s| **s == "created").count(), 1);
    assert_eq!(seq.iter().filter(|s| **s == "finalized").count(), 1);

    // The last content replacement carries the full cumulative text.
    let last_content = events
        .iter()
        .rev()
        .find_map(|e| match e {
            ChatEvent::MessageContent { content, .. } => Some(content.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_content, "The deadline moved.");

    // The finalized event carries the persisted message.
    let finalized = events
        .iter()
        .find_map(|e| match e {
            ChatEvent::MessageFinalized { message } => Some(message.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(finalized.content, "The deadline moved.");
    assert_eq!(finalized.role, Role::Assistant);
}

#[tokio::test]
async fn multi_round_tool_turn_publishes_two_visible_messages() {
    let h = harness(
        vec![
            MockRound::tool_call("call_1", "contact_lookup", serde_json::json!({"name": "Priya"})),
            MockRound::text(&["Priya's email is priya@example.com."]),
        ],
        Arc::new(LookupTool),
    );
    let chat = h.store.create_chat(None).unwrap();
    h.orchestrator
        .create_user_message(chat.id, "what's Priya's email?")
        .unwrap();

    h.orchestrator.respond(chat.id).await.unwrap();

    let events = h.broadcaster.events_for(chat.id);
    let seqs = sequences(&events);

    // Two visible assistant messages, each with its own full sequence.
    assert_eq!(seqs.len(), 2);
    for seq in seqs.values() {
        assert_eq!(seq.first(), Some(&"created"));
        assert_eq!(seq.last(), Some(&"finalized"));
        assert_eq!(seq.iter().filter(|s| **s == "created").count(), 1);
        assert_eq!(seq.iter().filter(|s| **s == "finalized").count(), 1);
    }

    // The first message finalizes before the second is created.
    let first_finalized = events
        .iter()
        .position(|e| matches!(e, ChatEvent::MessageFinalized { .. }))
        .unwrap();
    let second_created = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, ChatEvent::MessageCreated { .. }))
        .map(|(i, _)| i)
        .nth(1)
        .unwrap();
    assert!(first_finalized < second_created);

    // The intervening tool message is never published.
    let tool_message_id = h
        .store
        .conversation(chat.id)
        .unwrap()
        .into_iter()
        .find(|m| m.role == Role::Tool)
        .unwrap()
        .id;
    assert!(!seqs.contains_key(&tool_message_id));
    for event in &events {
        if let ChatEvent::MessageCreated { message } | ChatEvent::MessageFinalized { message } =
            event
        {
            assert_eq!(message.role, Role::Assistant);
        }
    }

    // Exactly one placeholder removal for the whole turn.
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, ChatEvent::ThinkingRemoved))
            .count(),
        1
    );
}

#[tokio::test]
async fn failure_mid_stream_overwrites_with_apology() {
    // Non-transient failure: nothing propagates, the UI reaches a terminal
    // state with the apology text.
    let h = harness(
        vec![MockRound::StreamThenFail(
            vec![minuted_core::types::StreamEvent::Token("partial ".into())],
            LlmError::ApiRequest {
                message: "model not found".into(),
            },
        )],
        Arc::new(NoTools),
    );
    let chat = h.store.create_chat(None).unwrap();
    h.orchestrator.create_user_message(chat.id, "hi").unwrap();

    h.orchestrator.respond(chat.id).await.unwrap();

    let apology = PromptConfig::default().apology;
    let assistant = h.store.last_assistant_message(chat.id).unwrap().unwrap();
    assert_eq!(assistant.content, apology);

    let events = h.broadcaster.events_for(chat.id);
    let finalized = events
        .iter()
        .find_map(|e| match e {
            ChatEvent::MessageFinalized { message } => Some(message.clone()),
            _ => None,
        })
        .expect("failure publishes a terminal finalized event");
    assert_eq!(finalized.content, apology);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, ChatEvent::ThinkingRemoved))
            .count(),
        1
    );
}

#[tokio::test]
async fn transient_failure_propagates_after_repair() {
    let h = harness(
        vec![MockRound::fail(LlmError::RateLimited {
            retry_after_secs: 3,
        })],
        Arc::new(NoTools),
    );
    let chat = h.store.create_chat(None).unwrap();
    h.orchestrator.create_user_message(chat.id, "hi").unwrap();

    let err = h.orchestrator.respond(chat.id).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.retry_after_secs(), Some(3));

    // Repair still happened before the error escaped: the blank row the
    // engine left behind was overwritten, so the chat is not poisoned.
    let apology = PromptConfig::default().apology;
    let assistant = h.store.last_assistant_message(chat.id).unwrap().unwrap();
    assert_eq!(assistant.content, apology);
    assert!(
        h.store
            .latest_blank_assistant_message(chat.id)
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn failure_before_any_message_publishes_error_notice() {
    // A chat that does not exist fails in setup, before the engine runs.
    let h = harness(vec![], Arc::new(NoTools));
    let missing_chat = Uuid::new_v4();

    h.orchestrator.respond(missing_chat).await.unwrap();

    let events = h.broadcaster.events_for(missing_chat);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, ChatEvent::ErrorNotice { .. }))
    );
    assert!(
        events
            .iter()
            .any(|e| matches!(e, ChatEvent::ThinkingRemoved))
    );
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, ChatEvent::MessageCreated { .. }))
    );
}

#[tokio::test]
async fn pre_turn_cleanup_removes_poisoned_message() {
    let h = harness(vec![MockRound::text(&["Fresh answer."])], Arc::new(NoTools));
    let chat = h.store.create_chat(None).unwrap();

    // A previous failed turn left a blank assistant message behind.
    let poisoned = ChatMessage::assistant(chat.id, "");
    h.store.create_message(&poisoned).unwrap();
    h.orchestrator.create_user_message(chat.id, "try again").unwrap();

    h.orchestrator.respond(chat.id).await.unwrap();

    let conversation = h.store.conversation(chat.id).unwrap();
    assert!(conversation.iter().all(|m| m.id != poisoned.id));
    assert!(conversation.iter().all(|m| !m.is_blank_assistant()));
}

#[tokio::test]
async fn meeting_chat_gets_retrieved_context_in_system_prompt() {
    let h = harness(vec![MockRound::text(&["From the transcript."])], Arc::new(NoTools));

    let meeting = h.store.create_meeting("Quarterly planning").unwrap();
    let transcript = h.store.create_transcript(meeting.id).unwrap();
    let segments: Vec<Segment> = vec![
        Segment::new("Alice", "The budget for the migration is approved.", 0).with_times(0.0, 5.0),
        Segment::new("Bob", "Deadlines move to Friday.", 1).with_times(5.0, 9.0),
    ];
    h.store.insert_segments(transcript.id, &segments).unwrap();
    minuted_core::store::regenerate_chunks(
        h.store.as_ref(),
        transcript.id,
        &minuted_core::config::ChunkerConfig::default(),
    )
    .unwrap();
    h.store
        .set_transcript_status(transcript.id, TranscriptStatus::Completed)
        .unwrap();

    let chat = h.store.create_chat(Some(meeting.id)).unwrap();
    h.orchestrator
        .create_user_message(chat.id, "what about the budget?")
        .unwrap();

    h.orchestrator.respond(chat.id).await.unwrap();

    let system = h
        .store
        .conversation(chat.id)
        .unwrap()
        .into_iter()
        .find(|m| m.role == Role::System)
        .expect("turn setup installs a system message");
    assert!(system.content.contains("Quarterly planning"));
    assert!(system.content.contains("selected portions, not the complete transcript"));
    assert!(system.content.contains("budget for the migration"));
}

#[tokio::test]
async fn meeting_chat_without_ready_transcript_notes_unavailability() {
    let h = harness(vec![MockRound::text(&["No transcript yet."])], Arc::new(NoTools));

    let meeting = h.store.create_meeting("Fresh upload").unwrap();
    h.store.create_transcript(meeting.id).unwrap(); // stays pending

    let chat = h.store.create_chat(Some(meeting.id)).unwrap();
    h.orchestrator
        .create_user_message(chat.id, "what was said?")
        .unwrap();

    h.orchestrator.respond(chat.id).await.unwrap();

    let system = h
        .store
        .conversation(chat.id)
        .unwrap()
        .into_iter()
        .find(|m| m.role == Role::System)
        .unwrap();
    assert!(system.content.contains("not available yet"));
    // Tools remain usable in this mode.
    assert!(system.content.contains("You have tools available"));
}

#[tokio::test]
async fn repeated_turns_keep_single_system_message() {
    let h = harness(
        vec![
            MockRound::text(&["First answer."]),
            MockRound::text(&["Second answer."]),
        ],
        Arc::new(NoTools),
    );
    let chat = h.store.create_chat(None).unwrap();

    h.orchestrator.create_user_message(chat.id, "one").unwrap();
    h.orchestrator.respond(chat.id).await.unwrap();
    h.orchestrator.create_user_message(chat.id, "two").unwrap();
    h.orchestrator.respond(chat.id).await.unwrap();

    let system_count = h
        .store
        .conversation(chat.id)
        .unwrap()
        .iter()
        .filter(|m| m.role == Role::System)
        .count();
    assert_eq!(system_count, 1);
}

#[tokio::test]
async fn throttling_suppresses_intermediate_publishes_but_flushes_final() {
    // A huge interval: only the first chunk publishes eagerly, everything
    // else rides on the finalize flush.
    let h = harness_with_interval(
        vec![MockRound::text(&["a", "b", "c", "d", "e"])],
        Arc::new(NoTools),
        10_000,
    );
    let chat = h.store.create_chat(None).unwrap();
    h.orchestrator.create_user_message(chat.id, "go").unwrap();

    h.orchestrator.respond(chat.id).await.unwrap();

    let contents: Vec<String> = h
        .broadcaster
        .events_for(chat.id)
        .into_iter()
        .filter_map(|e| match e {
            ChatEvent::MessageContent { content, .. } => Some(content),
            _ => None,
        })
        .collect();

    // One eager publish, one unconditional finalize flush.
    assert_eq!(contents.len(), 2);
    assert_eq!(contents[0], "a");
    assert_eq!(contents[1], "abcde");
}

#[tokio::test]
async fn cancelled_turn_publishes_nothing() {
    let h = harness(vec![MockRound::text(&["never seen"])], Arc::new(NoTools));
    let chat = h.store.create_chat(None).unwrap();
    h.orchestrator.create_user_message(chat.id, "hi").unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    h.orchestrator
        .respond_cancellable(chat.id, cancel)
        .await
        .unwrap();

    assert!(h.broadcaster.events_for(chat.id).is_empty());
}

#[tokio::test]
async fn broadcast_failures_never_crash_the_turn() {
    let h = harness(vec![MockRound::text(&["All good."])], Arc::new(NoTools));
    let chat = h.store.create_chat(None).unwrap();
    h.orchestrator.create_user_message(chat.id, "hi").unwrap();

    h.broadcaster.fail_from_now_on();
    h.orchestrator.respond(chat.id).await.unwrap();

    // The turn still completed and persisted its result.
    let assistant = h.store.last_assistant_message(chat.id).unwrap().unwrap();
    assert_eq!(assistant.content, "All good.");
}

#[tokio::test]
async fn queue_retries_transient_failures_until_success() {
    let store = Arc::new(MemoryStore::new());
    let broadcaster = Arc::new(RecordingBroadcaster::new());
    let engine = Arc::new(CompletionEngine::new(
        Arc::new(MockProvider::new(vec![
            MockRound::fail(LlmError::RateLimited { retry_after_secs: 0 }),
            MockRound::text(&["Recovered on retry."]),
        ])),
        Arc::new(NoTools),
        Arc::clone(&store) as Arc<dyn ConversationStore>,
        &LlmConfig::default(),
        &EngineConfig::default(),
    ));
    let orchestrator = Arc::new(ResponseOrchestrator::new(
        Arc::clone(&store) as Arc<dyn ConversationStore>,
        Arc::clone(&store) as Arc<dyn TranscriptStore>,
        engine,
        broadcaster as Arc<dyn minuted_core::broadcast::Broadcaster>,
        PromptConfig::default(),
        &PublishConfig { interval_ms: 0 },
        &RetrieverConfig::default(),
    ));

    let queue = TurnQueue::start(
        Arc::clone(&orchestrator),
        QueueConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            capacity: 8,
        },
    );

    let chat = store.create_chat(None).unwrap();
    let user = queue.send_message(chat.id, "hello").await.unwrap();
    assert_eq!(user.role, Role::User);

    // Shutting down waits for the in-flight turn, retries included.
    queue.shutdown().await;

    let assistant = store.last_assistant_message(chat.id).unwrap().unwrap();
    assert_eq!(assistant.content, "Recovered on retry.");
}

#[tokio::test]
async fn internal_tags_are_stripped_from_published_content() {
    let h = harness(
        vec![MockRound::text(&[
            "Answer<system-reminder>internal</system-reminder> text",
        ])],
        Arc::new(NoTools),
    );
    let chat = h.store.create_chat(None).unwrap();
    h.orchestrator.create_user_message(chat.id, "hi").unwrap();

    h.orchestrator.respond(chat.id).await.unwrap();

    for event in h.broadcaster.events_for(chat.id) {
        match event {
            ChatEvent::MessageContent { content, .. } => {
                assert!(!content.contains("system-reminder"));
            }
            ChatEvent::MessageFinalized { message } => {
                assert!(!message.content.contains("system-reminder"));
            }
            _ => {}
        }
    }
}
