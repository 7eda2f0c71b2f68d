use std::collections::HashMap;
use std::collections::HashSet;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Local;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::event::EventSpec;

/// Applied only here, when a finalized spec reaches the store with no
/// duration. Resolution itself never fills this in.
pub const DEFAULT_DURATION_MINUTES: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("Authentication required. Please login first.")]
    AuthRequired,

    #[error("calendar backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedEvent {
    pub link: String,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingEvent {
    pub summary: String,
    pub start_time: String,
    pub link: String,
}

#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// Errors with [`CalendarError::AuthRequired`] when the user has no
    /// usable credentials.
    async fn ensure_user(&self, user_id: &str) -> Result<(), CalendarError>;

    async fn create_event(
        &self,
        user_id: &str,
        spec: &EventSpec,
    ) -> Result<CreatedEvent, CalendarError>;

    async fn list_upcoming(
        &self,
        user_id: &str,
        max_results: usize,
    ) -> Result<Vec<UpcomingEvent>, CalendarError>;
}

#[derive(Debug, Clone)]
struct StoredEvent {
    summary: String,
    start_time: DateTime<Local>,
    link: String,
}

/// In-memory store for tests and local runs. Users must be authorized
/// explicitly; everything else errors the way a real backend would.
#[derive(Default)]
pub struct MemoryCalendarStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    authorized: HashSet<String>,
    events: HashMap<String, Vec<StoredEvent>>,
    next_id: u64,
}

impl MemoryCalendarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn authorize(&self, user_id: &str) {
        self.inner.lock().await.authorized.insert(user_id.to_string());
    }
}

#[async_trait]
impl CalendarStore for MemoryCalendarStore {
    async fn ensure_user(&self, user_id: &str) -> Result<(), CalendarError> {
        if self.inner.lock().await.authorized.contains(user_id) {
            Ok(())
        } else {
            Err(CalendarError::AuthRequired)
        }
    }

    async fn create_event(
        &self,
        user_id: &str,
        spec: &EventSpec,
    ) -> Result<CreatedEvent, CalendarError> {
        let start_time = spec
            .start_time
            .ok_or_else(|| CalendarError::Backend("event has no start time".to_string()))?;
        let duration_minutes = spec.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);

        let mut inner = self.inner.lock().await;
        if !inner.authorized.contains(user_id) {
            return Err(CalendarError::AuthRequired);
        }
        inner.next_id += 1;
        let link = format!("memory://{user_id}/events/{}", inner.next_id);
        inner
            .events
            .entry(user_id.to_string())
            .or_default()
            .push(StoredEvent {
                summary: spec.title.clone(),
                start_time,
                link: link.clone(),
            });
        tracing::info!(user = user_id, title = %spec.title, "created calendar event");
        Ok(CreatedEvent {
            link,
            duration_minutes,
        })
    }

    async fn list_upcoming(
        &self,
        user_id: &str,
        max_results: usize,
    ) -> Result<Vec<UpcomingEvent>, CalendarError> {
        let inner = self.inner.lock().await;
        if !inner.authorized.contains(user_id) {
            return Err(CalendarError::AuthRequired);
        }
        let now = Local::now();
        let mut upcoming: Vec<&StoredEvent> = inner
            .events
            .get(user_id)
            .map(|events| events.iter().filter(|e| e.start_time >= now).collect())
            .unwrap_or_default();
        upcoming.sort_by_key(|e| e.start_time);
        Ok(upcoming
            .into_iter()
            .take(max_results)
            .map(|e| UpcomingEvent {
                summary: e.summary.clone(),
                start_time: e.start_time.to_rfc3339(),
                link: e.link.clone(),
            })
            .collect())
    }
}
