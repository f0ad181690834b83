//! Meeting tools — lookup, participants, and summaries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use minuted_core::error::ToolError;
use minuted_core::store::DirectoryStore;
use serde_json::json;

use crate::registry::{Tool, limit_arg, optional_str, require_uuid};

/// Looks up meetings by title or recency.
pub struct MeetingLookupTool {
    store: Arc<dyn DirectoryStore>,
}

impl MeetingLookupTool {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MeetingLookupTool {
    fn name(&self) -> &str {
        "meeting_lookup"
    }

    fn description(&self) -> &str {
        "Looks up the user's meetings by title (partial match) or lists the most recent ones. \
         Returns each meeting's title, ID, and date."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Title text to search for (omit to list recent meetings)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum results (default 10)"
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let query = optional_str(&args, "query");
        let limit = limit_arg(&args, 10);

        let meetings = self
            .store
            .meetings_by_title(query, limit)
            .map_err(|e| ToolError::ExecutionFailed {
                name: self.name().to_string(),
                message: e.to_string(),
            })?;

        if meetings.is_empty() {
            return Ok(match query {
                Some(q) => format!("No meetings found matching \"{q}\"."),
                None => "No meetings found.".to_string(),
            });
        }

        Ok(meetings
            .iter()
            .map(|m| {
                format!(
                    "\"{}\" (ID: {}, {})",
                    m.title,
                    m.id,
                    m.created_at.format("%Y-%m-%d")
                )
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Lists a meeting's participants and their email addresses.
pub struct MeetingParticipantsTool {
    store: Arc<dyn DirectoryStore>,
}

impl MeetingParticipantsTool {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MeetingParticipantsTool {
    fn name(&self) -> &str {
        "meeting_participants"
    }

    fn description(&self) -> &str {
        "Lists the participants of a meeting with their email addresses. \
         Use before sending any email so addresses are real, never invented."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "meeting_id": {
                    "type": "string",
                    "description": "The meeting ID to list participants for"
                }
            },
            "required": ["meeting_id"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let meeting_id = require_uuid(&args, "meeting_id", self.name())?;

        let participants =
            self.store
                .participants(meeting_id)
                .map_err(|e| ToolError::ExecutionFailed {
                    name: self.name().to_string(),
                    message: e.to_string(),
                })?;

        if participants.is_empty() {
            return Ok("No participants are linked to this meeting.".to_string());
        }

        Ok(participants
            .iter()
            .map(|p| match &p.email {
                Some(email) => format!("{} <{}>", p.name, email),
                None => format!("{} (no email on record)", p.name),
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
}

/// Returns the stored summary for a meeting.
pub struct MeetingSummaryTool {
    store: Arc<dyn DirectoryStore>,
}

impl MeetingSummaryTool {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MeetingSummaryTool {
    fn name(&self) -> &str {
        "meeting_summary"
    }

    fn description(&self) -> &str {
        "Gets the AI-generated summary for a meeting. \
         Use when the user asks what a meeting was about."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "meeting_id": {
                    "type": "string",
                    "description": "The meeting ID to get the summary for"
                }
            },
            "required": ["meeting_id"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let meeting_id = require_uuid(&args, "meeting_id", self.name())?;

        let summary = self
            .store
            .summary(meeting_id)
            .map_err(|e| ToolError::ExecutionFailed {
                name: self.name().to_string(),
                message: e.to_string(),
            })?;

        Ok(summary.unwrap_or_else(|| "No summary is available for this meeting yet.".to_string()))
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minuted_core::store::{ConversationStore, MemoryStore};

    #[tokio::test]
    async fn test_meeting_lookup_by_title() {
        let store = Arc::new(MemoryStore::new());
        store.create_meeting("Quarterly planning").unwrap();
        store.create_meeting("Daily standup").unwrap();

        let tool = MeetingLookupTool::new(store);
        let output = tool.execute(json!({"query": "planning"})).await.unwrap();
        assert!(output.contains("Quarterly planning"));
        assert!(!output.contains("Daily standup"));
    }

    #[tokio::test]
    async fn test_meeting_lookup_no_match() {
        let store = Arc::new(MemoryStore::new());
        let tool = MeetingLookupTool::new(store);
        let output = tool.execute(json!({"query": "retro"})).await.unwrap();
        assert_eq!(output, "No meetings found matching \"retro\".");
    }

    #[tokio::test]
    async fn test_participants_listing() {
        let store = Arc::new(MemoryStore::new());
        let meeting = store.create_meeting("Sync").unwrap();
        store
            .add_participant(meeting.id, "Priya Shah", Some("priya@example.com"))
            .unwrap();
        store.add_participant(meeting.id, "Sam Lee", None).unwrap();

        let tool = MeetingParticipantsTool::new(store);
        let output = tool
            .execute(json!({"meeting_id": meeting.id.to_string()}))
            .await
            .unwrap();
        assert!(output.contains("Priya Shah <priya@example.com>"));
        assert!(output.contains("Sam Lee (no email on record)"));
    }

    #[tokio::test]
    async fn test_participants_invalid_id() {
        let store = Arc::new(MemoryStore::new());
        let tool = MeetingParticipantsTool::new(store);
        let result = tool.execute(json!({"meeting_id": "not-a-uuid"})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments { .. })));
    }

    #[tokio::test]
    async fn test_summary_missing() {
        let store = Arc::new(MemoryStore::new());
        let meeting = store.create_meeting("Sync").unwrap();
        let tool = MeetingSummaryTool::new(store);
        let output = tool
            .execute(json!({"meeting_id": meeting.id.to_string()}))
            .await
            .unwrap();
        assert!(output.contains("No summary"));
    }

    #[tokio::test]
    async fn test_summary_present() {
        let store = Arc::new(MemoryStore::new());
        let meeting = store.create_meeting("Sync").unwrap();
        store
            .set_summary(meeting.id, "Discussed the release plan.")
            .unwrap();
        let tool = MeetingSummaryTool::new(store);
        let output = tool
            .execute(json!({"meeting_id": meeting.id.to_string()}))
            .await
            .unwrap();
        assert_eq!(output, "Discussed the release plan.");
    }
}
