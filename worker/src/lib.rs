//! Worker side of the calendar bridge.
//!
//! Reads one JSON-RPC request per line from its input, handles it to
//! completion, writes exactly one response line, then reads the next.
//! Logs go to stderr; stdout carries nothing but the wire.

mod handlers;
mod processor;
mod tools;

pub use handlers::CalendarService;
pub use processor::MessageProcessor;
pub use tools::tool_descriptors;

use calpal_protocol::JsonRpcMessage;
use calpal_protocol::JsonRpcRequest;
use calpal_protocol::INTERNAL_ERROR_CODE;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

/// Installs the stderr logger. Call once, before any output.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

/// Serves requests from `reader` until EOF. Blank lines are skipped; a
/// line that is not a well-formed request gets an error object with a
/// null id, since there is no id to echo.
pub async fn run_with_streams<R, W>(
    reader: R,
    mut writer: W,
    service: CalendarService,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let processor = MessageProcessor::new(service);
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let outgoing = match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => processor.process_request(request).await,
            Err(e) => {
                tracing::warn!("dropping malformed request line: {e}");
                JsonRpcMessage::error(None, INTERNAL_ERROR_CODE, format!("Internal error: {e}"))
            }
        };
        let serialized = serde_json::to_string(&outgoing)?;
        writer.write_all(serialized.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    tracing::info!("input closed, shutting down");
    Ok(())
}

/// Serves the process stdio wire.
pub async fn run_main(service: CalendarService) -> anyhow::Result<()> {
    run_with_streams(tokio::io::stdin(), tokio::io::stdout(), service).await
}
