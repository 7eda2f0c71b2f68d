use async_trait::async_trait;

use crate::event::ConversationTurn;

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Request(String),

    #[error("completion returned an empty reply")]
    EmptyReply,
}

/// Seam to the text-completion collaborator. The resolver treats every
/// failure the same way (fall back to deterministic parsing), so the
/// error carries context for logs only.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        turns: &[ConversationTurn],
    ) -> Result<String, CompletionError>;
}
