//! # Minuted Tools
//!
//! The assistant's capabilities: meeting lookup, participants, summaries,
//! action items, contacts, and cross-meeting transcript search. Tools are
//! registered into a [`ToolRegistry`], which implements the engine's
//! `ToolExecutor` contract.

pub mod action_items;
pub mod contacts;
pub mod meeting;
pub mod registry;
pub mod transcript_search;

pub use action_items::{ActionItemsTool, CompleteActionItemTool, CreateActionItemTool};
pub use contacts::{ContactLookupTool, ManageContactTool};
pub use meeting::{MeetingLookupTool, MeetingParticipantsTool, MeetingSummaryTool};
pub use registry::{Tool, ToolRegistry};
pub use transcript_search::TranscriptSearchTool;

use std::sync::Arc;

use minuted_core::store::{DirectoryStore, TranscriptStore};

/// Build a registry with the full assistant tool set.
///
/// The registered set is passed to every turn; there is no per-turn
/// filtering.
pub fn assistant_registry(
    directory: Arc<dyn DirectoryStore>,
    transcripts: Arc<dyn TranscriptStore>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(MeetingLookupTool::new(Arc::clone(&directory))),
        Arc::new(MeetingParticipantsTool::new(Arc::clone(&directory))),
        Arc::new(MeetingSummaryTool::new(Arc::clone(&directory))),
        Arc::new(ActionItemsTool::new(Arc::clone(&directory))),
        Arc::new(CreateActionItemTool::new(Arc::clone(&directory))),
        Arc::new(CompleteActionItemTool::new(Arc::clone(&directory))),
        Arc::new(ContactLookupTool::new(Arc::clone(&directory))),
        Arc::new(ManageContactTool::new(directory)),
        Arc::new(TranscriptSearchTool::new(transcripts)),
    ];

    for tool in tools {
        // Names are unique by construction here.
        registry.register(tool).expect("assistant tool names are unique");
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use minuted_core::engine::ToolExecutor;
    use minuted_core::store::MemoryStore;

    #[test]
    fn test_assistant_registry_has_full_tool_set() {
        let store = Arc::new(MemoryStore::new());
        let registry = assistant_registry(
            Arc::clone(&store) as Arc<dyn DirectoryStore>,
            store as Arc<dyn TranscriptStore>,
        );

        let names = registry.list_names();
        assert_eq!(
            names,
            vec![
                "meeting_lookup",
                "meeting_participants",
                "meeting_summary",
                "action_items",
                "create_action_item",
                "complete_action_item",
                "contact_lookup",
                "manage_contact",
                "transcript_search",
            ]
        );

        // Every definition carries a JSON-schema object for its parameters.
        for def in registry.definitions() {
            assert_eq!(def.parameters["type"], "object");
            assert!(!def.description.is_empty());
        }
    }
}
