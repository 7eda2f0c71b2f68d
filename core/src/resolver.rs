//! Turns one free-text prompt into an [`EventSpec`].
//!
//! The primary path asks the text-completion collaborator to emit a
//! JSON object matching the [`EventSpec`] shape. Any failure on that
//! path, a
//! transport error, a timeout, a reply with no JSON object, a
//! timestamp that does not parse, sends the whole prompt to the
//! deterministic [`crate::fallback`] parser instead. Nothing from a
//! half-good completion reply is kept.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Local;
use chrono::NaiveDateTime;
use chrono::TimeZone;
use serde_json::Value;

use crate::completion::CompletionClient;
use crate::event::ConversationTurn;
use crate::event::EventSpec;
use crate::fallback;
use crate::fallback::ParseError;

/// Upper bound on one completion round trip. The fallback parser takes
/// over when it elapses.
pub const COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Resolver {
    client: Arc<dyn CompletionClient>,
}

impl Resolver {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Resolver { client }
    }

    /// Resolves `prompt` against the current wall clock. Prior turns in
    /// `context` are replayed to the collaborator ahead of the prompt.
    /// Fails only when neither path can find a date/time, which is a
    /// user-correctable condition rather than a fault.
    pub async fn resolve(
        &self,
        prompt: &str,
        context: &[ConversationTurn],
    ) -> Result<EventSpec, ParseError> {
        self.resolve_at(prompt, context, Local::now()).await
    }

    /// Same as [`Resolver::resolve`] with an explicit `now`, so tests
    /// pin the clock.
    pub async fn resolve_at(
        &self,
        prompt: &str,
        context: &[ConversationTurn],
        now: DateTime<Local>,
    ) -> Result<EventSpec, ParseError> {
        let mut spec = match self.complete(prompt, context, now).await {
            Some(spec) => spec,
            None => fallback::parse(prompt, now)?,
        };
        spec.enforce_followup_invariant();
        Ok(spec)
    }

    async fn complete(
        &self,
        prompt: &str,
        context: &[ConversationTurn],
        now: DateTime<Local>,
    ) -> Option<EventSpec> {
        let system_prompt = system_prompt(now);
        let mut turns = context.to_vec();
        turns.push(ConversationTurn::user(prompt));
        let reply = match tokio::time::timeout(
            COMPLETION_TIMEOUT,
            self.client.complete(&system_prompt, &turns),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::warn!("completion failed, using fallback parser: {e}");
                return None;
            }
            Err(_) => {
                tracing::warn!("completion timed out, using fallback parser");
                return None;
            }
        };

        let value = extract_json_object(&reply)?;
        let spec = spec_from_completion(&value);
        if spec.is_none() {
            tracing::warn!("completion reply had no usable date_time, using fallback parser");
        }
        spec
    }
}

fn system_prompt(now: DateTime<Local>) -> String {
    let today = now.format("%A, %B %d, %Y");
    let time = now.format("%I:%M %p");
    format!(
        "You are a calendar assistant that extracts event details from natural language.\n\
         Today is {today} and the current time is {time}.\n\
         Respond with a single JSON object and nothing else, using exactly these keys:\n\
         {{\"title\": string, \"date_time\": \"YYYY-MM-DDTHH:MM:SS\" in local time,\n\
          \"duration_minutes\": integer or null, \"location\": string or null,\n\
          \"description\": string, \"needs_followup\": boolean,\n\
          \"followup_questions\": array of strings}}\n\
         Never invent a duration or location the user did not state; leave the field null\n\
         and set needs_followup to true with a question for each unknown field.\n\
         Resolve relative dates against today and prefer future dates."
    )
}

/// First balanced `{...}` object in the reply, tolerant of prose or
/// code fences around it.
fn extract_json_object(reply: &str) -> Option<Value> {
    let start = reply.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in reply[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &reply[start..=start + offset];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

fn spec_from_completion(value: &Value) -> Option<EventSpec> {
    let obj = value.as_object()?;
    let raw_start = obj.get("date_time").and_then(Value::as_str)?;
    let start = parse_local_timestamp(raw_start)?;

    let title = obj
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let mut spec = EventSpec::new(title);
    spec.start_time = Some(start);
    spec.duration_minutes = obj.get("duration_minutes").and_then(Value::as_i64);
    spec.location = obj
        .get("location")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    spec.description = obj
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    spec.needs_followup = obj
        .get("needs_followup")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    spec.followup_questions = obj
        .get("followup_questions")
        .and_then(Value::as_array)
        .map(|qs| {
            qs.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some(spec)
}

/// ISO-ish local timestamp as the completion contract requires, with or
/// without an explicit offset.
fn parse_local_timestamp(raw: &str) -> Option<DateTime<Local>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Local.from_local_datetime(&naive).single();
        }
    }
    None
}
