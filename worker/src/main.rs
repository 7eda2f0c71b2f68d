use std::sync::Arc;

use calpal_completions::OpenAiClient;
use calpal_completions::StaticCompletions;
use calpal_core::calendar::MemoryCalendarStore;
use calpal_core::completion::CompletionClient;
use calpal_core::resolver::Resolver;
use calpal_worker::CalendarService;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    calpal_worker::init_logging();
    let service = build_service().await?;
    calpal_worker::run_main(service).await
}

async fn build_service() -> anyhow::Result<CalendarService> {
    let store = MemoryCalendarStore::new();
    if let Ok(users) = std::env::var("CALPAL_AUTHORIZED_USERS") {
        for user in users.split(',').map(str::trim).filter(|u| !u.is_empty()) {
            store.authorize(user).await;
        }
    }

    let client: Arc<dyn CompletionClient> = match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => {
            let base_url =
                std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
            let model = std::env::var("CALPAL_COMPLETION_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string());
            Arc::new(OpenAiClient::new(base_url, key, model)?)
        }
        _ => {
            tracing::warn!("OPENAI_API_KEY not set; relying on the deterministic parser only");
            Arc::new(StaticCompletions::new())
        }
    };

    Ok(CalendarService::new(
        Resolver::new(client),
        Arc::new(store),
    ))
}
