//! Tool handlers. Every path returns a [`ToolResponse`] envelope;
//! user-correctable problems (bad input, missing auth, unparseable
//! prompts) are envelope errors, never JSON-RPC faults.

use std::sync::Arc;

use calpal_core::calendar::CalendarError;
use calpal_core::calendar::CalendarStore;
use calpal_core::event::ConversationTurn;
use calpal_core::event::EventSpec;
use calpal_core::followup;
use calpal_core::resolver::Resolver;
use calpal_core::response::ToolResponse;
use serde_json::Value;

const UNSPECIFIED_LOCATION: &str = "Not specified";

pub struct CalendarService {
    resolver: Resolver,
    store: Arc<dyn CalendarStore>,
}

impl CalendarService {
    pub fn new(resolver: Resolver, store: Arc<dyn CalendarStore>) -> Self {
        CalendarService { resolver, store }
    }

    /// Resolve free text into an event. A spec with unknown slots comes
    /// back as a follow-up envelope carrying `parsed_data`; a complete
    /// spec is created immediately.
    pub async fn add_event(
        &self,
        user_id: &str,
        prompt: &str,
        chat_context: &[ConversationTurn],
    ) -> ToolResponse {
        if let Err(e) = self.ensure_user(user_id).await {
            return e;
        }
        let spec = match self.resolver.resolve(prompt, chat_context).await {
            Ok(spec) => spec,
            Err(e) => return ToolResponse::error(e.to_string()),
        };
        if spec.needs_followup {
            return match ToolResponse::followup(&spec) {
                Ok(envelope) => envelope,
                Err(e) => ToolResponse::error(format!("Internal error: {e}")),
            };
        }
        self.create(user_id, spec).await
    }

    /// Same as [`CalendarService::add_event`] with the duration fixed
    /// up front. A missing location does not block creation here; it is
    /// recorded as unspecified.
    pub async fn add_event_with_duration(
        &self,
        user_id: &str,
        prompt: &str,
        duration_minutes: i64,
        chat_context: &[ConversationTurn],
    ) -> ToolResponse {
        if let Err(e) = self.ensure_user(user_id).await {
            return e;
        }
        let mut spec = match self.resolver.resolve(prompt, chat_context).await {
            Ok(spec) => spec,
            Err(e) => return ToolResponse::error(e.to_string()),
        };
        spec.duration_minutes = Some(duration_minutes);
        self.create(user_id, spec).await
    }

    pub async fn list_upcoming(&self, user_id: &str, max_results: u32) -> ToolResponse {
        if let Err(e) = self.ensure_user(user_id).await {
            return e;
        }
        match self
            .store
            .list_upcoming(user_id, max_results as usize)
            .await
        {
            Ok(events) => ToolResponse::listed(events),
            Err(e) => ToolResponse::error(e.to_string()),
        }
    }

    /// Merges the follow-up answer into the partial spec from the
    /// earlier `parsed_data` and creates the event. One round only;
    /// whatever is still unknown afterwards passes through as-is.
    pub async fn handle_followup(
        &self,
        user_id: &str,
        original_prompt: &str,
        original_parsed_data: Value,
        followup_response: &str,
    ) -> ToolResponse {
        if let Err(e) = self.ensure_user(user_id).await {
            return e;
        }
        tracing::debug!(original_prompt, "completing event from follow-up answer");
        let spec: EventSpec = match serde_json::from_value(original_parsed_data) {
            Ok(spec) => spec,
            Err(e) => return ToolResponse::error(format!("Invalid original_parsed_data: {e}")),
        };
        let merged = followup::merge(spec, followup_response);
        self.create(user_id, merged).await
    }

    async fn ensure_user(&self, user_id: &str) -> Result<(), ToolResponse> {
        match self.store.ensure_user(user_id).await {
            Ok(()) => Ok(()),
            Err(CalendarError::AuthRequired) => Err(ToolResponse::auth_required()),
            Err(e) => Err(ToolResponse::error(e.to_string())),
        }
    }

    async fn create(&self, user_id: &str, mut spec: EventSpec) -> ToolResponse {
        spec.finalize();
        let created = match self.store.create_event(user_id, &spec).await {
            Ok(created) => created,
            Err(CalendarError::AuthRequired) => return ToolResponse::auth_required(),
            Err(e) => return ToolResponse::error(e.to_string()),
        };
        let message = match spec.start_time {
            Some(start) => format!(
                "Event '{}' created successfully for {}",
                spec.title,
                start.format("%B %d, %Y at %I:%M %p")
            ),
            None => format!("Event '{}' created successfully", spec.title),
        };
        ToolResponse {
            success: true,
            message: Some(message),
            title: Some(spec.title),
            start_time: spec.start_time.map(|dt| dt.to_rfc3339()),
            duration: Some(created.duration_minutes),
            location: Some(
                spec.location
                    .unwrap_or_else(|| UNSPECIFIED_LOCATION.to_string()),
            ),
            description: if spec.description.is_empty() {
                None
            } else {
                Some(spec.description)
            },
            link: Some(created.link),
            ..Default::default()
        }
    }
}
