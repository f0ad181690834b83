//! System prompt templates for the assistant.
//!
//! Templates are configuration handed to the orchestrator's constructor, so
//! tests can substitute cut-down prompts. Placeholders use `{name}` syntax
//! and are filled with plain substitution.

use chrono::NaiveDate;

use crate::types::Meeting;

const TOOL_USE_RULES: &str = "\
CRITICAL - Tool usage rules (you MUST follow these):
- NEVER pretend to call a tool or fabricate tool results. If you need information, actually call the tool.
- NEVER say \"let me look that up\" or \"I found...\" without making a real tool call first.
- If you need an email address, call meeting_participants or contact_lookup. Do not invent one.
- If a tool returns an error or \"not available\", report exactly what the tool returned.
- Do not narrate tool usage - just call the tools and respond with the real results.";

const EMAIL_RULES: &str = "\
Email rules:
- When sending emails, ALWAYS use the meeting_participants tool first to get participants'
  email addresses. If the meeting has no participants linked, fall back to contact_lookup.
- For action item emails, ALWAYS draft first so the user can review before sending.
- For summary emails, send immediately - no draft or confirmation needed.
- When the user provides an email, save it as a contact for future use.";

const ASSISTANT_PROMPT: &str = "\
You are a meeting assistant with access to the user's complete meeting history.
You can search meetings, review action items, create action items, and get summaries.

You can also search the actual transcript content across ALL meetings:
- Use the transcript_search tool to find what was discussed in any meeting by keyword or topic
- This returns matching transcript excerpts with their meeting context
- Use this when the user asks \"what did we discuss about X?\" or \"when did we talk about Y?\"

You also manage the user's contacts:
- List meeting participants to see who was in a meeting and their email addresses
- Look up contacts by name to find their email addresses
- Save new contacts when you learn someone's email (so you remember it next time)

{email_rules}

When answering questions:
- Use tools to find specific information rather than guessing
- Cite which meeting(s) your information comes from
- For cross-meeting questions, use transcript_search to find relevant discussions
- When asked to extract or add action items, use the create tool to save them
- Be concise and direct in your answers

{tool_rules}

The user's meetings are transcribed from audio recordings.
Today's date is {today}.";

const MEETING_PROMPT: &str = "\
You are a meeting assistant for the meeting \"{title}\" (meeting_id: {meeting_id}) from {date}.

IMPORTANT: When using tools that require a meeting_id parameter for THIS meeting, always use {meeting_id}.
You do NOT need to look up this meeting first - you already have its ID.

{transcript_section}

You have tools available:
- Look up other meetings by title, date, or participant
- List meeting participants to see who was in this meeting and their email addresses
- List action items across meetings (filter by assignee, status, or meeting)
- Create and save action items for a meeting (one per tool call)
- Get AI-generated summaries for any meeting
- Look up contacts by name to find email addresses
- Save new contacts when you learn someone's email

When the user asks you to take action (e.g. extract action items, summarize),
use your tools to save the results rather than just describing what you see.

{email_rules}

{tool_rules}

Be concise and direct. Cite specific quotes when relevant.
Today's date is {today}.";

const TRANSCRIPT_HEADER: &str = "\
Below are the most relevant sections of the transcript for the user's question.
Note: You are seeing selected portions, not the complete transcript.
If you cannot answer from the provided context, say so.";

const TRANSCRIPT_UNAVAILABLE: &str = "\
The transcript for this meeting is not available yet (it may still be processing). \
You can still use your tools to retrieve the summary, list participants, \
and manage action items.";

const APOLOGY: &str =
    "Sorry, something went wrong while generating this response. Please try again.";

/// Prompt templates and fixed user-facing strings.
#[derive(Debug, Clone)]
pub struct PromptConfig {
    pub assistant_prompt: String,
    pub meeting_prompt: String,
    pub tool_rules: String,
    pub email_rules: String,
    pub transcript_header: String,
    pub transcript_unavailable: String,
    /// User-facing text a failed turn's message is overwritten with.
    pub apology: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            assistant_prompt: ASSISTANT_PROMPT.to_string(),
            meeting_prompt: MEETING_PROMPT.to_string(),
            tool_rules: TOOL_USE_RULES.to_string(),
            email_rules: EMAIL_RULES.to_string(),
            transcript_header: TRANSCRIPT_HEADER.to_string(),
            transcript_unavailable: TRANSCRIPT_UNAVAILABLE.to_string(),
            apology: APOLOGY.to_string(),
        }
    }
}

impl PromptConfig {
    /// Instructions for the cross-meeting tool-agent mode.
    pub fn assistant_instructions(&self, today: NaiveDate) -> String {
        self.assistant_prompt
            .replace("{email_rules}", &self.email_rules)
            .replace("{tool_rules}", &self.tool_rules)
            .replace("{today}", &today.to_string())
    }

    /// Instructions for a meeting-scoped chat. `context` is the retrieved
    /// chunk block, or `None` while the transcript is not usable yet.
    pub fn meeting_instructions(
        &self,
        meeting: &Meeting,
        context: Option<&str>,
        today: NaiveDate,
    ) -> String {
        self.meeting_prompt
            .replace("{title}", &meeting.title)
            .replace("{meeting_id}", &meeting.id.to_string())
            .replace("{date}", &meeting.created_at.format("%B %d, %Y").to_string())
            .replace("{transcript_section}", &self.transcript_section(context))
            .replace("{email_rules}", &self.email_rules)
            .replace("{tool_rules}", &self.tool_rules)
            .replace("{today}", &today.to_string())
    }

    /// The transcript section of the meeting prompt. Tells the model the
    /// context is partial; when no context is usable, says so and points at
    /// the tools instead.
    pub fn transcript_section(&self, context: Option<&str>) -> String {
        match context {
            Some(block) if !block.is_empty() => {
                format!("{}\n\n{}", self.transcript_header, block)
            }
            _ => self.transcript_unavailable.clone(),
        }
    }
}
