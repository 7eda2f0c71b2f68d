use chrono::DateTime;
use chrono::Local;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

pub const DEFAULT_TITLE: &str = "Untitled Event";

/// Follow-up questions used whenever a slot cannot be filled from the
/// prompt itself.
pub const DURATION_QUESTION: &str = "What's the duration?";
pub const LOCATION_QUESTION: &str = "Where is this event?";

/// Candidate or final description of one calendar event.
///
/// `duration_minutes` and `location` distinguish "not yet known"
/// (`None`) from any concrete value; an unset slot is never silently
/// defaulted during resolution. The serde names match the wire shape of
/// `parsed_data`, so a follow-up round can resubmit the value
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EventSpec {
    pub title: String,
    #[serde(rename = "date_time", default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Local>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub needs_followup: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub followup_questions: Vec<String>,
}

impl EventSpec {
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        let title = if title.trim().is_empty() {
            DEFAULT_TITLE.to_string()
        } else {
            title
        };
        EventSpec {
            title,
            start_time: None,
            duration_minutes: None,
            location: None,
            description: String::new(),
            needs_followup: false,
            followup_questions: Vec::new(),
        }
    }

    /// True while either of the follow-up slots is still unknown.
    pub fn missing_slots(&self) -> bool {
        self.duration_minutes.is_none() || self.location.is_none()
    }

    /// Safety net over collaborator output: a spec with an unknown slot
    /// must ask for follow-up, whatever the collaborator claimed.
    pub fn enforce_followup_invariant(&mut self) {
        if !self.missing_slots() {
            return;
        }
        self.needs_followup = true;
        if self.followup_questions.is_empty() {
            if self.duration_minutes.is_none() {
                self.followup_questions.push(DURATION_QUESTION.to_string());
            }
            if self.location.is_none() {
                self.followup_questions.push(LOCATION_QUESTION.to_string());
            }
        }
    }

    /// Marks the spec final after the single follow-up round. Residual
    /// unknown slots are passed through to event creation as-is.
    pub fn finalize(&mut self) {
        self.needs_followup = false;
        self.followup_questions.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One prior turn of the resolution dialogue, replayed to the
/// text-completion collaborator so it has memory of the attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        ConversationTurn {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ConversationTurn {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
