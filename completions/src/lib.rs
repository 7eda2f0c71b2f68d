//! Text-completion collaborators.
//!
//! [`OpenAiClient`] speaks the OpenAI-compatible chat completions API
//! over HTTP. [`StaticCompletions`] is the in-process double used by
//! tests and offline runs.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use calpal_core::completion::CompletionClient;
use calpal_core::completion::CompletionError;
use calpal_core::event::ConversationTurn;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TEMPERATURE: f64 = 0.1;

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    /// `base_url` is the API root, e.g. `https://api.openai.com/v1`;
    /// the chat completions path is appended here.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, CompletionError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CompletionError::Request(e.to_string()))?;
        Ok(OpenAiClient {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        turns: &[ConversationTurn],
    ) -> Result<String, CompletionError> {
        let mut messages = vec![json!({ "role": "system", "content": system_prompt })];
        for turn in turns {
            messages.push(
                serde_json::to_value(turn).map_err(|e| CompletionError::Request(e.to_string()))?,
            );
        }
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": TEMPERATURE,
        });

        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(model = %self.model, "requesting completion");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CompletionError::Request(format!(
                "completion endpoint returned {status}: {detail}"
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Request(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(CompletionError::EmptyReply)
    }
}

/// Replays queued replies in order. An exhausted queue errors, which
/// exercises the caller's fallback path.
#[derive(Default)]
pub struct StaticCompletions {
    replies: Mutex<VecDeque<Result<String, String>>>,
}

impl StaticCompletions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().await.push_back(Ok(reply.into()));
    }

    pub async fn push_error(&self, message: impl Into<String>) {
        self.replies.lock().await.push_back(Err(message.into()));
    }
}

#[async_trait]
impl CompletionClient for StaticCompletions {
    async fn complete(
        &self,
        _system_prompt: &str,
        _turns: &[ConversationTurn],
    ) -> Result<String, CompletionError> {
        match self.replies.lock().await.pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(CompletionError::Request(message)),
            None => Err(CompletionError::Request(
                "no canned reply queued".to_string(),
            )),
        }
    }
}
