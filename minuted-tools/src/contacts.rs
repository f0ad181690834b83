//! Contact tools — lookup and save.

use std::sync::Arc;

use async_trait::async_trait;
use minuted_core::error::ToolError;
use minuted_core::store::{Contact, DirectoryStore};
use serde_json::json;

use crate::registry::{Tool, limit_arg, optional_str, require_str};

fn format_contact(contact: &Contact) -> String {
    let mut line = format!("{} <{}>", contact.name, contact.email);
    if let Some(notes) = &contact.notes {
        line.push_str(&format!(" - {notes}"));
    }
    line
}

/// Looks up contacts from the user's address book.
pub struct ContactLookupTool {
    store: Arc<dyn DirectoryStore>,
}

impl ContactLookupTool {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ContactLookupTool {
    fn name(&self) -> &str {
        "contact_lookup"
    }

    fn description(&self) -> &str {
        "Looks up contacts from the user's address book. \
         Use to find someone's email address before sending them an email."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Name to search for (partial match supported)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum results (default 10)"
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let name = optional_str(&args, "name");
        let limit = limit_arg(&args, 10);

        let contacts =
            self.store
                .contacts_by_name(name, limit)
                .map_err(|e| ToolError::ExecutionFailed {
                    name: self.name().to_string(),
                    message: e.to_string(),
                })?;

        if contacts.is_empty() {
            return Ok("No contacts found.".to_string());
        }

        Ok(contacts
            .iter()
            .map(format_contact)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Saves or updates a contact, so an address learned once is remembered.
pub struct ManageContactTool {
    store: Arc<dyn DirectoryStore>,
}

impl ManageContactTool {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ManageContactTool {
    fn name(&self) -> &str {
        "manage_contact"
    }

    fn description(&self) -> &str {
        "Saves a contact to the user's address book, or updates it if the name \
         already exists. Use when the user provides someone's email address."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "The contact's full name"
                },
                "email": {
                    "type": "string",
                    "description": "The contact's email address"
                },
                "notes": {
                    "type": "string",
                    "description": "Optional notes (role, company, context)"
                }
            },
            "required": ["name", "email"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let name = require_str(&args, "name", self.name())?.trim();
        let email = require_str(&args, "email", self.name())?.trim();
        if name.is_empty() || email.is_empty() {
            return Err(ToolError::InvalidArguments {
                name: self.name().to_string(),
                reason: "'name' and 'email' must be non-empty".to_string(),
            });
        }

        let contact = self
            .store
            .upsert_contact(name, email, optional_str(&args, "notes"))
            .map_err(|e| ToolError::ExecutionFailed {
                name: self.name().to_string(),
                message: e.to_string(),
            })?;

        Ok(format!("Saved contact: {}", format_contact(&contact)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minuted_core::store::MemoryStore;

    #[tokio::test]
    async fn test_lookup_empty() {
        let store = Arc::new(MemoryStore::new());
        let tool = ContactLookupTool::new(store);
        let output = tool.execute(json!({"name": "Priya"})).await.unwrap();
        assert_eq!(output, "No contacts found.");
    }

    #[tokio::test]
    async fn test_save_then_lookup() {
        let store = Arc::new(MemoryStore::new());
        let save = ManageContactTool::new(Arc::clone(&store) as Arc<dyn DirectoryStore>);
        save.execute(json!({
            "name": "Priya Shah",
            "email": "priya@example.com",
            "notes": "PM on the migration project"
        }))
        .await
        .unwrap();

        let lookup = ContactLookupTool::new(store);
        let output = lookup.execute(json!({"name": "priya"})).await.unwrap();
        assert!(output.contains("Priya Shah <priya@example.com>"));
        assert!(output.contains("PM on the migration project"));
    }

    #[tokio::test]
    async fn test_save_requires_fields() {
        let store = Arc::new(MemoryStore::new());
        let save = ManageContactTool::new(store);
        let result = save.execute(json!({"name": "Priya Shah"})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments { .. })));

        let store = Arc::new(MemoryStore::new());
        let save = ManageContactTool::new(store);
        let result = save.execute(json!({"name": "  ", "email": "x@example.com"})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments { .. })));
    }
}
