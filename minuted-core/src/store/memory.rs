//! In-memory store implementation.
//!
//! Backs unit and integration tests, and lightweight embedding scenarios
//! where durability is not needed. All three store traits over one
//! mutex-guarded state.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::StoreError;
use crate::retriever;
use crate::types::{Chat, ChatMessage, Chunk, Meeting, Role, Segment, ToolCall, TranscriptStatus};

use super::{
    ActionItem, ActionItemFilter, ChunkHit, Contact, ConversationStore, DirectoryStore,
    Participant, TranscriptInfo, TranscriptStore,
};

#[derive(Default)]
struct Inner {
    meetings: Vec<Meeting>,
    transcripts: Vec<TranscriptInfo>,
    segments: HashMap<Uuid, Vec<Segment>>,
    chunks: HashMap<Uuid, Vec<Chunk>>,
    chats: Vec<Chat>,
    /// Insertion order is creation order.
    messages: Vec<ChatMessage>,
    participants: Vec<Participant>,
    summaries: HashMap<Uuid, String>,
    action_items: Vec<ActionItem>,
    contacts: Vec<Contact>,
}

/// A store keeping everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Mutex poisoning only happens if a writer panicked; the data itself
        // is still coherent for reads, so recover rather than cascade.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TranscriptStore for MemoryStore {
    fn create_transcript(&self, meeting_id: Uuid) -> Result<TranscriptInfo, StoreError> {
        let transcript = TranscriptInfo {
            id: Uuid::new_v4(),
            meeting_id,
            status: TranscriptStatus::Pending,
        };
        self.lock().transcripts.push(transcript.clone());
        Ok(transcript)
    }

    fn set_transcript_status(&self, id: Uuid, status: TranscriptStatus) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for t in &mut inner.transcripts {
            if t.id == id {
                t.status = status;
                return Ok(());
            }
        }
        Err(StoreError::Database {
            message: format!("transcript {id} not found"),
        })
    }

    fn transcript_for_meeting(
        &self,
        meeting_id: Uuid,
    ) -> Result<Option<TranscriptInfo>, StoreError> {
        Ok(self
            .lock()
            .transcripts
            .iter()
            .find(|t| t.meeting_id == meeting_id)
            .cloned())
    }

    fn insert_segments(&self, transcript_id: Uuid, segments: &[Segment]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let entry = inner.segments.entry(transcript_id).or_default();
        entry.extend_from_slice(segments);
        entry.sort_by_key(|s| s.position);
        Ok(())
    }

    fn segments(&self, transcript_id: Uuid) -> Result<Vec<Segment>, StoreError> {
        Ok(self
            .lock()
            .segments
            .get(&transcript_id)
            .cloned()
            .unwrap_or_default())
    }

    fn replace_chunks(&self, transcript_id: Uuid, chunks: &[Chunk]) -> Result<(), StoreError> {
        self.lock().chunks.insert(transcript_id, chunks.to_vec());
        Ok(())
    }

    fn chunks(&self, transcript_id: Uuid) -> Result<Vec<Chunk>, StoreError> {
        let mut chunks = self
            .lock()
            .chunks
            .get(&transcript_id)
            .cloned()
            .unwrap_or_default();
        chunks.sort_by_key(|c| c.position);
        Ok(chunks)
    }

    fn search_chunks(&self, query: &str, limit: usize) -> Result<Vec<ChunkHit>, StoreError> {
        let inner = self.lock();
        let mut hits: Vec<(f64, ChunkHit)> = Vec::new();

        for transcript in &inner.transcripts {
            if transcript.status != TranscriptStatus::Completed {
                continue;
            }
            let Some(meeting) = inner.meetings.iter().find(|m| m.id == transcript.meeting_id)
            else {
                continue;
            };
            for chunk in inner.chunks.get(&transcript.id).into_iter().flatten() {
                let score = retriever::relevance(&chunk.content, query);
                if score > 0.0 {
                    hits.push((
                        score,
                        ChunkHit {
                            meeting_id: meeting.id,
                            meeting_title: meeting.title.clone(),
                            meeting_date: meeting.created_at,
                            position: chunk.position,
                            content: chunk.content.clone(),
                        },
                    ));
                }
            }
        }

        hits.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(hits.into_iter().take(limit).map(|(_, h)| h).collect())
    }
}

impl ConversationStore for MemoryStore {
    fn create_meeting(&self, title: &str) -> Result<Meeting, StoreError> {
        let meeting = Meeting {
            id: Uuid::new_v4(),
            title: title.to_string(),
            created_at: chrono::Utc::now(),
        };
        self.lock().meetings.push(meeting.clone());
        Ok(meeting)
    }

    fn meeting(&self, id: Uuid) -> Result<Option<Meeting>, StoreError> {
        Ok(self.lock().meetings.iter().find(|m| m.id == id).cloned())
    }

    fn create_chat(&self, meeting_id: Option<Uuid>) -> Result<Chat, StoreError> {
        let chat = Chat {
            id: Uuid::new_v4(),
            meeting_id,
            created_at: chrono::Utc::now(),
        };
        self.lock().chats.push(chat.clone());
        Ok(chat)
    }

    fn chat(&self, id: Uuid) -> Result<Chat, StoreError> {
        self.lock()
            .chats
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(StoreError::ChatNotFound { id })
    }

    fn create_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        self.lock().messages.push(message.clone());
        Ok(())
    }

    fn message(&self, id: Uuid) -> Result<ChatMessage, StoreError> {
        self.lock()
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or(StoreError::MessageNotFound { id })
    }

    fn update_message(
        &self,
        id: Uuid,
        content: &str,
        tool_calls: &[ToolCall],
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let msg = inner
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(StoreError::MessageNotFound { id })?;
        msg.content = content.to_string();
        msg.tool_calls = tool_calls.to_vec();
        Ok(())
    }

    fn conversation(&self, chat_id: Uuid) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self
            .lock()
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect())
    }

    fn replace_system_message(&self, chat_id: Uuid, content: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner
            .messages
            .retain(|m| !(m.chat_id == chat_id && m.role == Role::System));
        inner.messages.push(ChatMessage::system(chat_id, content));
        Ok(())
    }

    fn delete_blank_assistant_messages(&self, chat_id: Uuid) -> Result<usize, StoreError> {
        let mut inner = self.lock();
        let before = inner.messages.len();
        inner
            .messages
            .retain(|m| !(m.chat_id == chat_id && m.is_blank_assistant()));
        Ok(before - inner.messages.len())
    }

    fn latest_user_message(&self, chat_id: Uuid) -> Result<Option<ChatMessage>, StoreError> {
        Ok(self
            .lock()
            .messages
            .iter()
            .rev()
            .find(|m| m.chat_id == chat_id && m.role == Role::User)
            .cloned())
    }

    fn last_assistant_message(&self, chat_id: Uuid) -> Result<Option<ChatMessage>, StoreError> {
        Ok(self
            .lock()
            .messages
            .iter()
            .rev()
            .find(|m| m.chat_id == chat_id && m.role == Role::Assistant)
            .cloned())
    }

    fn latest_blank_assistant_message(
        &self,
        chat_id: Uuid,
    ) -> Result<Option<ChatMessage>, StoreError> {
        Ok(self
            .lock()
            .messages
            .iter()
            .rev()
            .find(|m| m.chat_id == chat_id && m.is_blank_assistant())
            .cloned())
    }
}

impl DirectoryStore for MemoryStore {
    fn meetings_by_title(
        &self,
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Meeting>, StoreError> {
        let inner = self.lock();
        let needle = query.map(str::to_lowercase);
        let mut meetings: Vec<Meeting> = inner
            .meetings
            .iter()
            .filter(|m| match &needle {
                Some(n) => m.title.to_lowercase().contains(n),
                None => true,
            })
            .cloned()
            .collect();
        meetings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        meetings.truncate(limit);
        Ok(meetings)
    }

    fn participants(&self, meeting_id: Uuid) -> Result<Vec<Participant>, StoreError> {
        Ok(self
            .lock()
            .participants
            .iter()
            .filter(|p| p.meeting_id == meeting_id)
            .cloned()
            .collect())
    }

    fn add_participant(
        &self,
        meeting_id: Uuid,
        name: &str,
        email: Option<&str>,
    ) -> Result<Participant, StoreError> {
        let participant = Participant {
            id: Uuid::new_v4(),
            meeting_id,
            name: name.to_string(),
            email: email.map(String::from),
        };
        self.lock().participants.push(participant.clone());
        Ok(participant)
    }

    fn summary(&self, meeting_id: Uuid) -> Result<Option<String>, StoreError> {
        Ok(self.lock().summaries.get(&meeting_id).cloned())
    }

    fn set_summary(&self, meeting_id: Uuid, summary: &str) -> Result<(), StoreError> {
        self.lock().summaries.insert(meeting_id, summary.to_string());
        Ok(())
    }

    fn action_items(&self, filter: &ActionItemFilter) -> Result<Vec<ActionItem>, StoreError> {
        Ok(self
            .lock()
            .action_items
            .iter()
            .filter(|item| {
                filter.meeting_id.is_none_or(|id| item.meeting_id == id)
                    && filter.assignee.as_deref().is_none_or(|a| {
                        item.assignee
                            .as_deref()
                            .is_some_and(|x| x.eq_ignore_ascii_case(a))
                    })
                    && filter.completed.is_none_or(|c| item.completed == c)
            })
            .cloned()
            .collect())
    }

    fn find_action_item(
        &self,
        meeting_id: Uuid,
        description: &str,
    ) -> Result<Option<ActionItem>, StoreError> {
        Ok(self
            .lock()
            .action_items
            .iter()
            .find(|item| {
                item.meeting_id == meeting_id
                    && item.description.eq_ignore_ascii_case(description)
            })
            .cloned())
    }

    fn create_action_item(
        &self,
        meeting_id: Uuid,
        description: &str,
        assignee: Option<&str>,
        due_date: Option<NaiveDate>,
    ) -> Result<ActionItem, StoreError> {
        let item = ActionItem {
            id: Uuid::new_v4(),
            meeting_id,
            description: description.to_string(),
            assignee: assignee.map(String::from),
            due_date,
            completed: false,
        };
        self.lock().action_items.push(item.clone());
        Ok(item)
    }

    fn complete_action_item(&self, id: Uuid) -> Result<Option<ActionItem>, StoreError> {
        let mut inner = self.lock();
        for item in &mut inner.action_items {
            if item.id == id {
                item.completed = true;
                return Ok(Some(item.clone()));
            }
        }
        Ok(None)
    }

    fn contacts_by_name(
        &self,
        name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Contact>, StoreError> {
        let inner = self.lock();
        let needle = name.map(str::to_lowercase);
        let mut contacts: Vec<Contact> = inner
            .contacts
            .iter()
            .filter(|c| match &needle {
                Some(n) => c.name.to_lowercase().contains(n),
                None => true,
            })
            .cloned()
            .collect();
        contacts.sort_by(|a, b| a.name.cmp(&b.name));
        contacts.truncate(limit);
        Ok(contacts)
    }

    fn upsert_contact(
        &self,
        name: &str,
        email: &str,
        notes: Option<&str>,
    ) -> Result<Contact, StoreError> {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .contacts
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name))
        {
            existing.email = email.to_string();
            if notes.is_some() {
                existing.notes = notes.map(String::from);
            }
            return Ok(existing.clone());
        }
        let contact = Contact {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            notes: notes.map(String::from),
        };
        inner.contacts.push(contact.clone());
        Ok(contact)
    }
}
