//! Publish/subscribe sink for live chat updates.
//!
//! Downstream UIs subscribe by chat id and receive the event sequence the
//! orchestrator guarantees: per visible message one `MessageCreated`, zero or
//! more `MessageContent` replacements, one `MessageFinalized`. A
//! `ThinkingRemoved` event fires once per turn, and `ErrorNotice` covers
//! failures that happen before any message exists.
//!
//! Content is stripped of provider-internal `<system-reminder>` spans before
//! it leaves the system.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::BroadcastError;
use crate::types::ChatMessage;

/// An event published on a chat's channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Append a message placeholder to the visible list.
    MessageCreated { message: ChatMessage },
    /// Replace the named message's content container. Always the full
    /// accumulated text, never an append, so the UI stays idempotent under
    /// throttled delivery.
    MessageContent { message_id: Uuid, content: String },
    /// Replace the whole message element with its canonical rendering.
    MessageFinalized { message: ChatMessage },
    /// Remove the turn's "thinking" placeholder.
    ThinkingRemoved,
    /// A failure notice not tied to any message id.
    ErrorNotice { text: String },
}

/// The publishing seam the orchestrator writes to.
pub trait Broadcaster: Send + Sync {
    fn publish(&self, chat_id: Uuid, event: ChatEvent) -> Result<(), BroadcastError>;
}

/// Strip `<system-reminder>…</system-reminder>` spans a provider may inject.
pub fn strip_internal_tags(text: &str) -> String {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        regex::Regex::new(r"(?s)<system-reminder>.*?</system-reminder>")
            .expect("internal tag pattern is valid")
    });
    re.replace_all(text, "").into_owned()
}

/// In-process pub/sub over per-chat tokio broadcast channels.
///
/// Publishing to a chat nobody subscribes to succeeds; subscribers that lag
/// beyond the channel capacity miss intermediate content replacements, which
/// is safe because every replacement carries the full text.
pub struct ChannelBroadcaster {
    channels: RwLock<HashMap<Uuid, broadcast::Sender<ChatEvent>>>,
    capacity: usize,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Subscribe to a chat's event stream.
    pub fn subscribe(&self, chat_id: Uuid) -> broadcast::Receiver<ChatEvent> {
        self.sender(chat_id).subscribe()
    }

    /// Drop a chat's channel, disconnecting its subscribers.
    pub fn remove(&self, chat_id: Uuid) {
        if let Ok(mut channels) = self.channels.write() {
            channels.remove(&chat_id);
        }
    }

    fn sender(&self, chat_id: Uuid) -> broadcast::Sender<ChatEvent> {
        if let Ok(channels) = self.channels.read()
            && let Some(sender) = channels.get(&chat_id)
        {
            return sender.clone();
        }
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(chat_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn publish(&self, chat_id: Uuid, event: ChatEvent) -> Result<(), BroadcastError> {
        // A send error only means there are no subscribers right now.
        let _ = self.sender(chat_id).send(event);
        Ok(())
    }
}

/// Records every published event. Test support.
#[derive(Default)]
pub struct RecordingBroadcaster {
    events: Mutex<Vec<(Uuid, ChatEvent)>>,
    fail: std::sync::atomic::AtomicBool,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail, for exercising the swallow path.
    pub fn fail_from_now_on(&self) {
        self.fail.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<(Uuid, ChatEvent)> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The events published for one chat, in order.
    pub fn events_for(&self, chat_id: Uuid) -> Vec<ChatEvent> {
        self.events()
            .into_iter()
            .filter(|(id, _)| *id == chat_id)
            .map(|(_, e)| e)
            .collect()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn publish(&self, chat_id: Uuid, event: ChatEvent) -> Result<(), BroadcastError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(BroadcastError::Publish {
                chat_id,
                message: "recording broadcaster set to fail".to_string(),
            });
        }
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((chat_id, event));
        Ok(())
    }
}
