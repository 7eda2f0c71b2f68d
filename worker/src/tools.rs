//! Tool descriptors and argument shapes surfaced by `tools/list`.

use calpal_core::event::ConversationTurn;
use calpal_protocol::Tool;
use schemars::schema_for;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

pub const TOOL_ADD_EVENT: &str = "add_calendar_event";
pub const TOOL_ADD_EVENT_WITH_DURATION: &str = "add_calendar_event_with_duration";
pub const TOOL_LIST_UPCOMING: &str = "list_upcoming_events";
pub const TOOL_HANDLE_FOLLOWUP: &str = "handle_followup_response";

pub const DEFAULT_MAX_RESULTS: u32 = 10;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddEventArgs {
    /// Calendar owner, usually an email address.
    pub user_id: String,
    /// Free-text description of the event.
    pub prompt: String,
    /// Prior turns of the conversation, replayed to the completion
    /// collaborator ahead of the prompt.
    #[serde(default)]
    pub chat_context: Vec<ConversationTurn>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddEventWithDurationArgs {
    pub user_id: String,
    pub prompt: String,
    /// Event length in minutes; overrides anything found in the prompt.
    pub duration_minutes: i64,
    #[serde(default)]
    pub chat_context: Vec<ConversationTurn>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListUpcomingArgs {
    pub user_id: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FollowupArgs {
    pub user_id: String,
    /// The prompt that triggered the follow-up questions.
    pub original_prompt: String,
    /// The partial event exactly as returned in the earlier
    /// `parsed_data` field.
    pub original_parsed_data: Value,
    /// The user's answer to the follow-up questions.
    pub followup_response: String,
}

fn descriptor<T: JsonSchema>(name: &str, description: &str) -> Tool {
    let schema = serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| Value::Null);
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: schema,
    }
}

pub fn tool_descriptors() -> Vec<Tool> {
    vec![
        descriptor::<AddEventArgs>(
            TOOL_ADD_EVENT,
            "Create a calendar event from a natural language description. \
             May ask follow-up questions for missing details.",
        ),
        descriptor::<AddEventWithDurationArgs>(
            TOOL_ADD_EVENT_WITH_DURATION,
            "Create a calendar event from a natural language description \
             with an explicit duration in minutes.",
        ),
        descriptor::<ListUpcomingArgs>(
            TOOL_LIST_UPCOMING,
            "List the user's upcoming calendar events.",
        ),
        descriptor::<FollowupArgs>(
            TOOL_HANDLE_FOLLOWUP,
            "Complete event creation using the user's answer to earlier \
             follow-up questions.",
        ),
    ]
}
