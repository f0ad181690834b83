//! Cross-meeting transcript search.

use std::sync::Arc;

use async_trait::async_trait;
use minuted_core::error::ToolError;
use minuted_core::store::{ChunkHit, TranscriptStore};
use serde_json::json;

use crate::registry::{Tool, limit_arg, require_str};

fn format_hit(hit: &ChunkHit) -> String {
    format!(
        "Meeting: \"{}\" (ID: {}, {})\nPosition: {}\n\n{}",
        hit.meeting_title,
        hit.meeting_id,
        hit.meeting_date.format("%Y-%m-%d"),
        hit.position,
        hit.content
    )
}

/// Searches transcript content across all of the user's meetings.
pub struct TranscriptSearchTool {
    store: Arc<dyn TranscriptStore>,
}

impl TranscriptSearchTool {
    pub fn new(store: Arc<dyn TranscriptStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for TranscriptSearchTool {
    fn name(&self) -> &str {
        "transcript_search"
    }

    fn description(&self) -> &str {
        "Searches transcript content across all of the user's meetings. \
         Use this to find what was discussed in any meeting by keyword or topic. \
         Returns matching transcript excerpts with their meeting context."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search term or topic to find in transcripts"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of transcript chunks to return (default 10)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let query = require_str(&args, "query", self.name())?;
        let limit = limit_arg(&args, 10);

        let hits = self
            .store
            .search_chunks(query, limit)
            .map_err(|e| ToolError::ExecutionFailed {
                name: self.name().to_string(),
                message: e.to_string(),
            })?;

        if hits.is_empty() {
            return Ok(format!("No transcript content found matching \"{query}\"."));
        }

        Ok(hits
            .iter()
            .map(format_hit)
            .collect::<Vec<_>>()
            .join("\n\n---\n\n"))
    }
}
