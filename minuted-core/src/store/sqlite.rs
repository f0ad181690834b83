//! SQLite-backed store implementation.
//!
//! One database holds meetings, transcripts, segments, chunks, chats,
//! messages, participants, summaries, action items, and contacts. The schema
//! is created on open. UUIDs are stored as text, timestamps as RFC 3339,
//! tool calls as a JSON column.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::error::StoreError;
use crate::retriever;
use crate::types::{Chat, ChatMessage, Chunk, Meeting, Role, Segment, ToolCall, TranscriptStatus};

use super::{
    ActionItem, ActionItemFilter, ChunkHit, Contact, ConversationStore, DirectoryStore,
    Participant, TranscriptInfo, TranscriptStore,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS meetings (
    id          TEXT PRIMARY KEY,
    title       TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS transcripts (
    id          TEXT PRIMARY KEY,
    meeting_id  TEXT NOT NULL REFERENCES meetings(id),
    status      TEXT NOT NULL DEFAULT 'pending'
);
CREATE INDEX IF NOT EXISTS idx_transcripts_meeting ON transcripts(meeting_id);

CREATE TABLE IF NOT EXISTS transcript_segments (
    transcript_id TEXT NOT NULL REFERENCES transcripts(id),
    position      INTEGER NOT NULL,
    speaker       TEXT NOT NULL,
    text          TEXT NOT NULL,
    start_time    REAL,
    end_time      REAL,
    PRIMARY KEY (transcript_id, position)
);

CREATE TABLE IF NOT EXISTS transcript_chunks (
    transcript_id TEXT NOT NULL REFERENCES transcripts(id),
    position      INTEGER NOT NULL,
    content       TEXT NOT NULL,
    start_time    REAL,
    end_time      REAL,
    embedding     BLOB,
    PRIMARY KEY (transcript_id, position)
);

CREATE TABLE IF NOT EXISTS chats (
    id          TEXT PRIMARY KEY,
    meeting_id  TEXT REFERENCES meetings(id),
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    seq           INTEGER PRIMARY KEY AUTOINCREMENT,
    id            TEXT NOT NULL UNIQUE,
    chat_id       TEXT NOT NULL REFERENCES chats(id),
    role          TEXT NOT NULL,
    content       TEXT NOT NULL DEFAULT '',
    tool_calls    TEXT NOT NULL DEFAULT '[]',
    tool_call_id  TEXT,
    created_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id);

CREATE TABLE IF NOT EXISTS participants (
    id          TEXT PRIMARY KEY,
    meeting_id  TEXT NOT NULL REFERENCES meetings(id),
    name        TEXT NOT NULL,
    email       TEXT
);

CREATE TABLE IF NOT EXISTS summaries (
    meeting_id  TEXT PRIMARY KEY REFERENCES meetings(id),
    summary     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS action_items (
    id          TEXT PRIMARY KEY,
    meeting_id  TEXT NOT NULL REFERENCES meetings(id),
    description TEXT NOT NULL,
    assignee    TEXT,
    due_date    TEXT,
    completed   INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS contacts (
    id     TEXT PRIMARY KEY,
    name   TEXT NOT NULL,
    email  TEXT NOT NULL,
    notes  TEXT
);
";

/// A store backed by a single SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database at `path` and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_uuid(s: String) -> Result<Uuid, StoreError> {
    Uuid::parse_str(&s).map_err(|e| StoreError::Database {
        message: format!("invalid uuid in database: {e}"),
    })
}

fn parse_datetime(s: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Database {
            message: format!("invalid timestamp in database: {e}"),
        })
}

fn parse_role(s: String) -> Result<Role, StoreError> {
    s.parse().map_err(|e: String| StoreError::Database { message: e })
}

fn parse_status(s: String) -> Result<TranscriptStatus, StoreError> {
    s.parse().map_err(|e: String| StoreError::Database { message: e })
}

fn parse_tool_calls(s: String) -> Result<Vec<ToolCall>, StoreError> {
    serde_json::from_str(&s).map_err(|e| StoreError::Database {
        message: format!("invalid tool_calls in database: {e}"),
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMessage> {
    Ok(RawMessage {
        id: row.get("id")?,
        chat_id: row.get("chat_id")?,
        role: row.get("role")?,
        content: row.get("content")?,
        tool_calls: row.get("tool_calls")?,
        tool_call_id: row.get("tool_call_id")?,
        created_at: row.get("created_at")?,
    })
}

struct RawMessage {
    id: String,
    chat_id: String,
    role: String,
    content: String,
    tool_calls: String,
    tool_call_id: Option<String>,
    created_at: String,
}

impl RawMessage {
    fn into_message(self) -> Result<ChatMessage, StoreError> {
        Ok(ChatMessage {
            id: parse_uuid(self.id)?,
            chat_id: parse_uuid(self.chat_id)?,
            role: parse_role(self.role)?,
            content: self.content,
            tool_calls: parse_tool_calls(self.tool_calls)?,
            tool_call_id: self.tool_call_id,
            created_at: parse_datetime(self.created_at)?,
        })
    }
}

impl TranscriptStore for SqliteStore {
    fn create_transcript(&self, meeting_id: Uuid) -> Result<TranscriptInfo, StoreError> {
        let id = Uuid::new_v4();
        self.lock().execute(
            "INSERT INTO transcripts (id, meeting_id, status) VALUES (?1, ?2, 'pending')",
            params![id.to_string(), meeting_id.to_string()],
        )?;
        Ok(TranscriptInfo {
            id,
            meeting_id,
            status: TranscriptStatus::Pending,
        })
    }

    fn set_transcript_status(&self, id: Uuid, status: TranscriptStatus) -> Result<(), StoreError> {
        let changed = self.lock().execute(
            "UPDATE transcripts SET status = ?1 WHERE id = ?2",
            params![status.to_string(), id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::Database {
                message: format!("transcript {id} not found"),
            });
        }
        Ok(())
    }

    fn transcript_for_meeting(
        &self,
        meeting_id: Uuid,
    ) -> Result<Option<TranscriptInfo>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, meeting_id, status FROM transcripts WHERE meeting_id = ?1",
                params![meeting_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, meeting_id, status)| {
            Ok(TranscriptInfo {
                id: parse_uuid(id)?,
                meeting_id: parse_uuid(meeting_id)?,
                status: parse_status(status)?,
            })
        })
        .transpose()
    }

    fn insert_segments(&self, transcript_id: Uuid, segments: &[Segment]) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO transcript_segments
                 (transcript_id, position, speaker, text, start_time, end_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for s in segments {
                stmt.execute(params![
                    transcript_id.to_string(),
                    s.position,
                    s.speaker,
                    s.text,
                    s.start_time,
                    s.end_time,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn segments(&self, transcript_id: Uuid) -> Result<Vec<Segment>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT speaker, text, start_time, end_time, position
             FROM transcript_segments WHERE transcript_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![transcript_id.to_string()], |row| {
            Ok(Segment {
                speaker: row.get(0)?,
                text: row.get(1)?,
                start_time: row.get(2)?,
                end_time: row.get(3)?,
                position: row.get(4)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::from)
    }

    fn replace_chunks(&self, transcript_id: Uuid, chunks: &[Chunk]) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM transcript_chunks WHERE transcript_id = ?1",
            params![transcript_id.to_string()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO transcript_chunks
                 (transcript_id, position, content, start_time, end_time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for c in chunks {
                stmt.execute(params![
                    transcript_id.to_string(),
                    c.position,
                    c.content,
                    c.start_time,
                    c.end_time,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn chunks(&self, transcript_id: Uuid) -> Result<Vec<Chunk>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT content, start_time, end_time, position
             FROM transcript_chunks WHERE transcript_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![transcript_id.to_string()], |row| {
            Ok(Chunk {
                content: row.get(0)?,
                start_time: row.get(1)?,
                end_time: row.get(2)?,
                position: row.get(3)?,
                embedding: None,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::from)
    }

    fn search_chunks(&self, query: &str, limit: usize) -> Result<Vec<ChunkHit>, StoreError> {
        // Candidate rows come from SQL; relevance ranking happens in Rust so
        // both store implementations order results identically.
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT m.id, m.title, m.created_at, c.position, c.content
             FROM transcript_chunks c
             JOIN transcripts t ON t.id = c.transcript_id
             JOIN meetings m ON m.id = t.meeting_id
             WHERE t.status = 'completed'",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut hits: Vec<(f64, ChunkHit)> = Vec::new();
        for row in rows {
            let (meeting_id, title, created_at, position, content) = row?;
            let score = retriever::relevance(&content, query);
            if score > 0.0 {
                hits.push((
                    score,
                    ChunkHit {
                        meeting_id: parse_uuid(meeting_id)?,
                        meeting_title: title,
                        meeting_date: parse_datetime(created_at)?,
                        position,
                        content,
                    },
                ));
            }
        }
        hits.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(hits.into_iter().take(limit).map(|(_, h)| h).collect())
    }
}

impl ConversationStore for SqliteStore {
    fn create_meeting(&self, title: &str) -> Result<Meeting, StoreError> {
        let meeting = Meeting {
            id: Uuid::new_v4(),
            title: title.to_string(),
            created_at: Utc::now(),
        };
        self.lock().execute(
            "INSERT INTO meetings (id, title, created_at) VALUES (?1, ?2, ?3)",
            params![
                meeting.id.to_string(),
                meeting.title,
                meeting.created_at.to_rfc3339(),
            ],
        )?;
        Ok(meeting)
    }

    fn meeting(&self, id: Uuid) -> Result<Option<Meeting>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT title, created_at FROM meetings WHERE id = ?1",
                params![id.to_string()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        row.map(|(title, created_at)| {
            Ok(Meeting {
                id,
                title,
                created_at: parse_datetime(created_at)?,
            })
        })
        .transpose()
    }

    fn create_chat(&self, meeting_id: Option<Uuid>) -> Result<Chat, StoreError> {
        let chat = Chat {
            id: Uuid::new_v4(),
            meeting_id,
            created_at: Utc::now(),
        };
        self.lock().execute(
            "INSERT INTO chats (id, meeting_id, created_at) VALUES (?1, ?2, ?3)",
            params![
                chat.id.to_string(),
                chat.meeting_id.map(|id| id.to_string()),
                chat.created_at.to_rfc3339(),
            ],
        )?;
        Ok(chat)
    }

    fn chat(&self, id: Uuid) -> Result<Chat, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT meeting_id, created_at FROM chats WHERE id = ?1",
                params![id.to_string()],
                |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?
            .ok_or(StoreError::ChatNotFound { id })?;
        Ok(Chat {
            id,
            meeting_id: row.0.map(parse_uuid).transpose()?,
            created_at: parse_datetime(row.1)?,
        })
    }

    fn create_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        let tool_calls = serde_json::to_string(&message.tool_calls).map_err(|e| {
            StoreError::Database {
                message: format!("failed to encode tool_calls: {e}"),
            }
        })?;
        self.lock().execute(
            "INSERT INTO messages (id, chat_id, role, content, tool_calls, tool_call_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id.to_string(),
                message.chat_id.to_string(),
                message.role.to_string(),
                message.content,
                tool_calls,
                message.tool_call_id,
                message.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn message(&self, id: Uuid) -> Result<ChatMessage, StoreError> {
        let conn = self.lock();
        let raw = conn
            .query_row(
                "SELECT id, chat_id, role, content, tool_calls, tool_call_id, created_at
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                message_from_row,
            )
            .optional()?
            .ok_or(StoreError::MessageNotFound { id })?;
        raw.into_message()
    }

    fn update_message(
        &self,
        id: Uuid,
        content: &str,
        tool_calls: &[ToolCall],
    ) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(tool_calls).map_err(|e| StoreError::Database {
            message: format!("failed to encode tool_calls: {e}"),
        })?;
        let changed = self.lock().execute(
            "UPDATE messages SET content = ?1, tool_calls = ?2 WHERE id = ?3",
            params![content, encoded, id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::MessageNotFound { id });
        }
        Ok(())
    }

    fn conversation(&self, chat_id: Uuid) -> Result<Vec<ChatMessage>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, role, content, tool_calls, tool_call_id, created_at
             FROM messages WHERE chat_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![chat_id.to_string()], message_from_row)?;
        let mut messages = Vec::new();
        for raw in rows {
            messages.push(raw?.into_message()?);
        }
        Ok(messages)
    }

    fn replace_system_message(&self, chat_id: Uuid, content: &str) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM messages WHERE chat_id = ?1 AND role = 'system'",
            params![chat_id.to_string()],
        )?;
        let msg = ChatMessage::system(chat_id, content);
        tx.execute(
            "INSERT INTO messages (id, chat_id, role, content, tool_calls, tool_call_id, created_at)
             VALUES (?1, ?2, 'system', ?3, '[]', NULL, ?4)",
            params![
                msg.id.to_string(),
                chat_id.to_string(),
                msg.content,
                msg.created_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete_blank_assistant_messages(&self, chat_id: Uuid) -> Result<usize, StoreError> {
        let removed = self.lock().execute(
            "DELETE FROM messages
             WHERE chat_id = ?1 AND role = 'assistant' AND content = '' AND tool_calls = '[]'",
            params![chat_id.to_string()],
        )?;
        Ok(removed)
    }

    fn latest_user_message(&self, chat_id: Uuid) -> Result<Option<ChatMessage>, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, chat_id, role, content, tool_calls, tool_call_id, created_at
             FROM messages WHERE chat_id = ?1 AND role = 'user'
             ORDER BY seq DESC LIMIT 1",
            params![chat_id.to_string()],
            message_from_row,
        )
        .optional()?
        .map(RawMessage::into_message)
        .transpose()
    }

    fn last_assistant_message(&self, chat_id: Uuid) -> Result<Option<ChatMessage>, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, chat_id, role, content, tool_calls, tool_call_id, created_at
             FROM messages WHERE chat_id = ?1 AND role = 'assistant'
             ORDER BY seq DESC LIMIT 1",
            params![chat_id.to_string()],
            message_from_row,
        )
        .optional()?
        .map(RawMessage::into_message)
        .transpose()
    }

    fn latest_blank_assistant_message(
        &self,
        chat_id: Uuid,
    ) -> Result<Option<ChatMessage>, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, chat_id, role, content, tool_calls, tool_call_id, created_at
             FROM messages
             WHERE chat_id = ?1 AND role = 'assistant' AND content = '' AND tool_calls = '[]'
             ORDER BY seq DESC LIMIT 1",
            params![chat_id.to_string()],
            message_from_row,
        )
        .optional()?
        .map(RawMessage::into_message)
        .transpose()
    }
}

impl DirectoryStore for SqliteStore {
    fn meetings_by_title(
        &self,
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Meeting>, StoreError> {
        let conn = self.lock();
        let pattern = query
            .map(|q| format!("%{}%", q.to_lowercase()))
            .unwrap_or_else(|| "%".to_string());
        let mut stmt = conn.prepare(
            "SELECT id, title, created_at FROM meetings
             WHERE lower(title) LIKE ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![pattern, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut meetings = Vec::new();
        for row in rows {
            let (id, title, created_at) = row?;
            meetings.push(Meeting {
                id: parse_uuid(id)?,
                title,
                created_at: parse_datetime(created_at)?,
            });
        }
        Ok(meetings)
    }

    fn participants(&self, meeting_id: Uuid) -> Result<Vec<Participant>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, email FROM participants WHERE meeting_id = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map(params![meeting_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;
        let mut participants = Vec::new();
        for row in rows {
            let (id, name, email) = row?;
            participants.push(Participant {
                id: parse_uuid(id)?,
                meeting_id,
                name,
                email,
            });
        }
        Ok(participants)
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
        self.lock().execute(
            "INSERT INTO participants (id, meeting_id, name, email) VALUES (?1, ?2, ?3, ?4)",
            params![
                participant.id.to_string(),
                meeting_id.to_string(),
                participant.name,
                participant.email,
            ],
        )?;
        Ok(participant)
    }

    fn summary(&self, meeting_id: Uuid) -> Result<Option<String>, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT summary FROM summaries WHERE meeting_id = ?1",
            params![meeting_id.to_string()],
            |row| row.get(0),
        )
        .optional()
        .map_err(StoreError::from)
    }

    fn set_summary(&self, meeting_id: Uuid, summary: &str) -> Result<(), StoreError> {
        self.lock().execute(
            "INSERT INTO summaries (meeting_id, summary) VALUES (?1, ?2)
             ON CONFLICT(meeting_id) DO UPDATE SET summary = excluded.summary",
            params![meeting_id.to_string(), summary],
        )?;
        Ok(())
    }

    fn action_items(&self, filter: &ActionItemFilter) -> Result<Vec<ActionItem>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, meeting_id, description, assignee, due_date, completed
             FROM action_items ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, bool>(5)?,
            ))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (id, meeting_id, description, assignee, due_date, completed) = row?;
            let item = ActionItem {
                id: parse_uuid(id)?,
                meeting_id: parse_uuid(meeting_id)?,
                description,
                assignee,
                due_date: due_date
                    .map(|d| {
                        NaiveDate::parse_from_str(&d, "%Y-%m-%d").map_err(|e| {
                            StoreError::Database {
                                message: format!("invalid due date in database: {e}"),
                            }
                        })
                    })
                    .transpose()?,
                completed,
            };
            let keep = filter.meeting_id.is_none_or(|id| item.meeting_id == id)
                && filter.assignee.as_deref().is_none_or(|a| {
                    item.assignee
                        .as_deref()
                        .is_some_and(|x| x.eq_ignore_ascii_case(a))
                })
                && filter.completed.is_none_or(|c| item.completed == c);
            if keep {
                items.push(item);
            }
        }
        Ok(items)
    }

    fn find_action_item(
        &self,
        meeting_id: Uuid,
        description: &str,
    ) -> Result<Option<ActionItem>, StoreError> {
        let items = self.action_items(&ActionItemFilter {
            meeting_id: Some(meeting_id),
            ..Default::default()
        })?;
        Ok(items
            .into_iter()
            .find(|i| i.description.eq_ignore_ascii_case(description)))
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
        self.lock().execute(
            "INSERT INTO action_items (id, meeting_id, description, assignee, due_date, completed)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![
                item.id.to_string(),
                meeting_id.to_string(),
                item.description,
                item.assignee,
                item.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
            ],
        )?;
        Ok(item)
    }

    fn complete_action_item(&self, id: Uuid) -> Result<Option<ActionItem>, StoreError> {
        let changed = self.lock().execute(
            "UPDATE action_items SET completed = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let items = self.action_items(&ActionItemFilter::default())?;
        Ok(items.into_iter().find(|i| i.id == id))
    }

    fn contacts_by_name(
        &self,
        name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Contact>, StoreError> {
        let conn = self.lock();
        let pattern = name
            .map(|n| format!("%{}%", n.to_lowercase()))
            .unwrap_or_else(|| "%".to_string());
        let mut stmt = conn.prepare(
            "SELECT id, name, email, notes FROM contacts
             WHERE lower(name) LIKE ?1 ORDER BY name LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![pattern, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;
        let mut contacts = Vec::new();
        for row in rows {
            let (id, name, email, notes) = row?;
            contacts.push(Contact {
                id: parse_uuid(id)?,
                name,
                email,
                notes,
            });
        }
        Ok(contacts)
    }

    fn upsert_contact(
        &self,
        name: &str,
        email: &str,
        notes: Option<&str>,
    ) -> Result<Contact, StoreError> {
        let conn = self.lock();
        let existing = conn
            .query_row(
                "SELECT id, notes FROM contacts WHERE lower(name) = lower(?1)",
                params![name],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;

        if let Some((id, old_notes)) = existing {
            let new_notes = notes.map(String::from).or(old_notes);
            conn.execute(
                "UPDATE contacts SET email = ?1, notes = ?2 WHERE id = ?3",
                params![email, new_notes, id],
            )?;
            return Ok(Contact {
                id: parse_uuid(id)?,
                name: name.to_string(),
                email: email.to_string(),
                notes: new_notes,
            });
        }

        let contact = Contact {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            notes: notes.map(String::from),
        };
        conn.execute(
            "INSERT INTO contacts (id, name, email, notes) VALUES (?1, ?2, ?3, ?4)",
            params![
                contact.id.to_string(),
                contact.name,
                contact.email,
                contact.notes,
            ],
        )?;
        Ok(contact)
    }
}
