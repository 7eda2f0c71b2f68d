//! Domain model and slot-filling resolution for calpal.
//!
//! Resolution turns one free-text prompt into an [`event::EventSpec`].
//! The language-understanding path talks to a text-completion
//! collaborator behind [`completion::CompletionClient`]; when that path
//! is unavailable or misbehaves, [`fallback`] extracts a best-effort
//! date/time deterministically. [`followup`] completes a partial spec
//! from the user's one follow-up answer.

pub mod calendar;
pub mod completion;
pub mod event;
pub mod fallback;
pub mod followup;
pub mod resolver;
pub mod response;

pub use calendar::CalendarError;
pub use calendar::CalendarStore;
pub use calendar::CreatedEvent;
pub use calendar::MemoryCalendarStore;
pub use calendar::UpcomingEvent;
pub use completion::CompletionClient;
pub use completion::CompletionError;
pub use event::ConversationTurn;
pub use event::EventSpec;
pub use event::Role;
pub use fallback::ParseError;
pub use resolver::Resolver;
pub use response::ToolResponse;
