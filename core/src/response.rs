use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::calendar::UpcomingEvent;
use crate::event::EventSpec;

pub const AUTH_REQUIRED_MESSAGE: &str = "Authentication required. Please login first.";
pub const FOLLOWUP_MESSAGE: &str =
    "Please provide additional details to complete the event creation.";

/// Result envelope every tool call returns inside the text content
/// block. Fields are sparse; only those relevant to the outcome are
/// serialized, which keeps the shape identical across bridge versions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_auth: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_followup: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followup_questions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<UpcomingEvent>>,
}

impl ToolResponse {
    /// Input or backend error. Never a JSON-RPC fault; the caller gets
    /// a well-formed envelope it can show to the user.
    pub fn error(message: impl Into<String>) -> Self {
        ToolResponse {
            success: false,
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn auth_required() -> Self {
        ToolResponse {
            success: false,
            error: Some(AUTH_REQUIRED_MESSAGE.to_string()),
            needs_auth: Some(true),
            ..Default::default()
        }
    }

    /// Asks the user for the one follow-up round, carrying the partial
    /// spec as `parsed_data` so the answer can be merged into it.
    pub fn followup(spec: &EventSpec) -> Result<Self, serde_json::Error> {
        Ok(ToolResponse {
            success: false,
            needs_followup: Some(true),
            followup_questions: Some(spec.followup_questions.clone()),
            parsed_data: Some(serde_json::to_value(spec)?),
            message: Some(FOLLOWUP_MESSAGE.to_string()),
            ..Default::default()
        })
    }

    pub fn listed(events: Vec<UpcomingEvent>) -> Self {
        ToolResponse {
            success: true,
            events: Some(events),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn error_envelope_is_sparse() {
        let got = match serde_json::to_value(ToolResponse::error("Missing required parameter: text"))
        {
            Ok(v) => v,
            Err(e) => panic!("failed to serialize envelope: {e}"),
        };
        assert_eq!(
            got,
            json!({ "success": false, "error": "Missing required parameter: text" })
        );
    }

    #[test]
    fn auth_envelope_sets_needs_auth() {
        let got = match serde_json::to_value(ToolResponse::auth_required()) {
            Ok(v) => v,
            Err(e) => panic!("failed to serialize envelope: {e}"),
        };
        assert_eq!(
            got,
            json!({
                "success": false,
                "error": "Authentication required. Please login first.",
                "needs_auth": true
            })
        );
    }

    #[test]
    fn followup_envelope_carries_parsed_data() {
        let mut spec = EventSpec::new("team meeting");
        spec.enforce_followup_invariant();
        let envelope = match ToolResponse::followup(&spec) {
            Ok(r) => r,
            Err(e) => panic!("failed to build follow-up envelope: {e}"),
        };
        assert!(!envelope.success);
        assert_eq!(envelope.needs_followup, Some(true));
        assert_eq!(
            envelope.followup_questions,
            Some(vec![
                "What's the duration?".to_string(),
                "Where is this event?".to_string(),
            ])
        );
        let parsed = match envelope.parsed_data {
            Some(v) => v,
            None => panic!("follow-up envelope is missing parsed_data"),
        };
        assert_eq!(parsed["title"], json!("team meeting"));
    }
}
