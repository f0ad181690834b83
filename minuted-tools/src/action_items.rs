//! Action item tools — list, create, and complete.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use minuted_core::error::ToolError;
use minuted_core::store::{ActionItem, ActionItemFilter, DirectoryStore};
use serde_json::json;

use crate::registry::{Tool, optional_str, require_str, require_uuid};

fn format_item(item: &ActionItem) -> String {
    let mut line = format!(
        "[{}] {} (ID: {})",
        if item.completed { "x" } else { " " },
        item.description,
        item.id
    );
    if let Some(assignee) = &item.assignee {
        line.push_str(&format!(" - assigned to {assignee}"));
    }
    if let Some(due) = item.due_date {
        line.push_str(&format!(" - due {due}"));
    }
    line
}

/// Lists action items, filterable by meeting, assignee, and status.
pub struct ActionItemsTool {
    store: Arc<dyn DirectoryStore>,
}

impl ActionItemsTool {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ActionItemsTool {
    fn name(&self) -> &str {
        "action_items"
    }

    fn description(&self) -> &str {
        "Lists action items across the user's meetings. \
         Filter by meeting_id, assignee, or status (open, completed, all)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "meeting_id": {
                    "type": "string",
                    "description": "Only items from this meeting"
                },
                "assignee": {
                    "type": "string",
                    "description": "Only items assigned to this person"
                },
                "status": {
                    "type": "string",
                    "enum": ["open", "completed", "all"],
                    "description": "Completion filter (default all)"
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let meeting_id = match optional_str(&args, "meeting_id") {
            Some(_) => Some(require_uuid(&args, "meeting_id", self.name())?),
            None => None,
        };
        let completed = match optional_str(&args, "status") {
            Some("open") => Some(false),
            Some("completed") => Some(true),
            _ => None,
        };

        let filter = ActionItemFilter {
            meeting_id,
            assignee: optional_str(&args, "assignee").map(String::from),
            completed,
        };

        let items = self
            .store
            .action_items(&filter)
            .map_err(|e| ToolError::ExecutionFailed {
                name: self.name().to_string(),
                message: e.to_string(),
            })?;

        if items.is_empty() {
            return Ok("No action items found.".to_string());
        }

        Ok(items.iter().map(format_item).collect::<Vec<_>>().join("\n"))
    }
}

/// Creates one action item per call.
pub struct CreateActionItemTool {
    store: Arc<dyn DirectoryStore>,
}

impl CreateActionItemTool {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreateActionItemTool {
    fn name(&self) -> &str {
        "create_action_item"
    }

    fn description(&self) -> &str {
        "Creates an action item for a meeting. Call once per action item. \
         Use when the user asks to extract, add, or save action items."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "meeting_id": {
                    "type": "string",
                    "description": "The meeting ID to add the action item to"
                },
                "description": {
                    "type": "string",
                    "description": "What needs to be done"
                },
                "assignee": {
                    "type": "string",
                    "description": "Person responsible for the task"
                },
                "due_date": {
                    "type": "string",
                    "description": "Due date in YYYY-MM-DD format"
                }
            },
            "required": ["meeting_id", "description"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let meeting_id = require_uuid(&args, "meeting_id", self.name())?;
        let description = require_str(&args, "description", self.name())?.trim();
        let assignee = optional_str(&args, "assignee");

        let due_date = match optional_str(&args, "due_date") {
            Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => return Ok("Invalid due date format. Use YYYY-MM-DD.".to_string()),
            },
            None => None,
        };

        let run = || -> Result<String, minuted_core::error::StoreError> {
            if let Some(existing) = self.store.find_action_item(meeting_id, description)? {
                return Ok(format!(
                    "Action item already exists: {}",
                    existing.description
                ));
            }

            let item = self
                .store
                .create_action_item(meeting_id, description, assignee, due_date)?;

            let mut result = format!("Created action item: {}", item.description);
            if let Some(assignee) = &item.assignee {
                result.push_str(&format!(" (assigned to {assignee})"));
            }
            if let Some(due) = item.due_date {
                result.push_str(&format!(" due {due}"));
            }
            Ok(result)
        };

        run().map_err(|e| ToolError::ExecutionFailed {
            name: self.name().to_string(),
            message: e.to_string(),
        })
    }
}

/// Marks an action item as done.
pub struct CompleteActionItemTool {
    store: Arc<dyn DirectoryStore>,
}

impl CompleteActionItemTool {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CompleteActionItemTool {
    fn name(&self) -> &str {
        "complete_action_item"
    }

    fn description(&self) -> &str {
        "Marks an action item as completed. \
         Use the action item IDs returned by the action_items tool."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "action_item_id": {
                    "type": "string",
                    "description": "The ID of the action item to complete"
                }
            },
            "required": ["action_item_id"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let id = require_uuid(&args, "action_item_id", self.name())?;

        let completed =
            self.store
                .complete_action_item(id)
                .map_err(|e| ToolError::ExecutionFailed {
                    name: self.name().to_string(),
                    message: e.to_string(),
                })?;

        Ok(match completed {
            Some(item) => format!("Completed action item: {}", item.description),
            None => "Action item not found.".to_string(),
        })
    }
}
