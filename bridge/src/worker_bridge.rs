use std::collections::HashMap;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use calpal_core::event::ConversationTurn;
use calpal_core::response::ToolResponse;
use calpal_protocol::CallToolResult;
use calpal_protocol::JsonRpcMessage;
use calpal_protocol::ListToolsResult;
use calpal_protocol::RequestId;
use calpal_protocol::METHOD_TOOLS_CALL;
use calpal_protocol::METHOD_TOOLS_LIST;
use serde_json::json;
use serde_json::Value;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio::time::timeout;

use crate::env::create_worker_env;

/// Read deadline for one invoke round trip.
pub const INVOKE_TIMEOUT: Duration = Duration::from_secs(60);

const START_ATTEMPTS: u32 = 3;
const START_RETRY_BACKOFF: Duration = Duration::from_secs(2);
const SETTLE_WINDOW: Duration = Duration::from_secs(2);
const CLOUD_SETTLE_WINDOW: Duration = Duration::from_secs(3);
const STOP_GRACE: Duration = Duration::from_secs(5);
const STDERR_TAIL_LINES: usize = 40;

/// Platforms where cold starts are slow enough to warrant a longer
/// settle window.
const CLOUD_ENV_VARS: &[&str] = &["RAILWAY_ENVIRONMENT", "RENDER", "HEROKU"];

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to start worker: {0}")]
    Startup(String),

    #[error("worker communication failed: {0}")]
    Communication(String),

    #[error("worker did not answer within {0:?}")]
    Timeout(Duration),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("worker error {code}: {message}")]
    Worker { code: i64, message: String },
}

#[derive(Clone)]
struct SpawnSpec {
    program: String,
    args: Vec<String>,
    extra_env: Option<HashMap<String, String>>,
}

type StderrTail = Arc<std::sync::Mutex<VecDeque<String>>>;

struct Transport {
    reader: Box<dyn AsyncBufRead + Send + Unpin>,
    writer: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    child: Option<Child>,
    stderr_tail: Option<StderrTail>,
}

struct Inner {
    transport: Option<Transport>,
    spawn_spec: Option<SpawnSpec>,
    next_id: i64,
}

enum RoundtripFailure {
    Timeout,
    Io(String),
    Malformed(String),
}

/// Caller-side handle to one worker process.
///
/// All calls are single-flight: one mutex guards the child, both pipes
/// and the id counter, so exactly one request is in flight and every
/// response on the pipe belongs to the request just written. After a
/// timeout the transport is discarded and the next invoke starts a
/// fresh worker.
pub struct WorkerBridge {
    inner: Mutex<Inner>,
    read_timeout: Duration,
}

impl WorkerBridge {
    /// Starts the worker process and waits for it to settle. Up to
    /// three attempts, 2 s apart; stderr from a worker that dies during
    /// startup ends up in the error.
    pub async fn spawn(
        program: &str,
        args: &[&str],
        extra_env: Option<HashMap<String, String>>,
    ) -> Result<Self, BridgeError> {
        let spec = SpawnSpec {
            program: program.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
            extra_env,
        };
        let transport = start_worker(&spec).await?;
        Ok(WorkerBridge {
            inner: Mutex::new(Inner {
                transport: Some(transport),
                spawn_spec: Some(spec),
                next_id: 1,
            }),
            read_timeout: INVOKE_TIMEOUT,
        })
    }

    /// Bridge over caller-supplied streams instead of a child process.
    /// There is nothing to respawn, so a dead transport stays dead.
    pub fn with_streams<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        WorkerBridge {
            inner: Mutex::new(Inner {
                transport: Some(Transport {
                    reader: Box::new(BufReader::new(reader)),
                    writer: Some(Box::new(writer)),
                    child: None,
                    stderr_tail: None,
                }),
                spawn_spec: None,
                next_id: 1,
            }),
            read_timeout: INVOKE_TIMEOUT,
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// One request, one response. Ids are monotonically increasing
    /// integers; a response carrying any other id is a protocol fault
    /// for this call only.
    pub async fn invoke(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        let mut inner = self.inner.lock().await;

        if inner.transport.is_none() {
            let spec = inner.spawn_spec.clone().ok_or_else(|| {
                BridgeError::Communication("transport is closed".to_string())
            })?;
            tracing::info!("restarting worker before invoke");
            inner.transport = Some(start_worker(&spec).await?);
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let line = serde_json::to_string(&JsonRpcMessage::request(id, method, params))
            .map_err(|e| BridgeError::Communication(e.to_string()))?;

        let transport = match inner.transport.as_mut() {
            Some(t) => t,
            None => return Err(BridgeError::Communication("transport is closed".to_string())),
        };

        let message = match roundtrip(transport, &line, self.read_timeout).await {
            Ok(message) => message,
            Err(RoundtripFailure::Timeout) => {
                let diagnosis = diagnose_dead_worker(transport).await;
                tracing::error!(method, "invoke timed out; discarding worker: {diagnosis}");
                inner.transport = None;
                return Err(BridgeError::Timeout(self.read_timeout));
            }
            Err(RoundtripFailure::Io(detail)) => {
                let diagnosis = diagnose_dead_worker(transport).await;
                tracing::error!(method, "invoke failed; discarding worker: {diagnosis}");
                inner.transport = None;
                return Err(BridgeError::Communication(detail));
            }
            Err(RoundtripFailure::Malformed(detail)) => {
                // The worker answered, just not with valid JSON-RPC.
                // It stays up; only this call fails.
                return Err(BridgeError::Communication(detail));
            }
        };

        match message {
            JsonRpcMessage::Response(response) => {
                if response.id != RequestId::Integer(id) {
                    return Err(BridgeError::Protocol(format!(
                        "response id {} does not match request id {id}",
                        response.id
                    )));
                }
                Ok(response.result)
            }
            JsonRpcMessage::Error(error) => Err(BridgeError::Worker {
                code: error.error.code,
                message: error.error.message,
            }),
            JsonRpcMessage::Request(_) => Err(BridgeError::Protocol(
                "worker sent a request instead of a response".to_string(),
            )),
        }
    }

    /// Graceful shutdown: close stdin so the worker sees EOF, wait up
    /// to 5 s, then kill. Safe to call more than once.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        inner.spawn_spec = None;
        let Some(mut transport) = inner.transport.take() else {
            return;
        };
        drop(transport.writer.take());
        if let Some(mut child) = transport.child.take() {
            match timeout(STOP_GRACE, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!("worker exited with {status}"),
                Ok(Err(e)) => tracing::warn!("failed waiting for worker exit: {e}"),
                Err(_) => {
                    tracing::warn!("worker ignored EOF for {STOP_GRACE:?}; killing it");
                    if let Err(e) = child.kill().await {
                        tracing::warn!("failed to kill worker: {e}");
                    }
                }
            }
        }
    }

    pub async fn list_tools(&self) -> Result<ListToolsResult, BridgeError> {
        let value = self.invoke(METHOD_TOOLS_LIST, json!({})).await?;
        serde_json::from_value(value)
            .map_err(|e| BridgeError::Protocol(format!("malformed tools/list result: {e}")))
    }

    /// Calls one tool and unwraps the text-content envelope back into
    /// the JSON result the tool produced.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResponse, BridgeError> {
        let value = self
            .invoke(METHOD_TOOLS_CALL, json!({ "name": name, "arguments": arguments }))
            .await?;
        let result: CallToolResult = serde_json::from_value(value)
            .map_err(|e| BridgeError::Protocol(format!("malformed tools/call result: {e}")))?;
        let text = result.first_text().ok_or_else(|| {
            BridgeError::Protocol("tool result carries no text content".to_string())
        })?;
        serde_json::from_str(text)
            .map_err(|e| BridgeError::Protocol(format!("malformed tool result envelope: {e}")))
    }

    pub async fn add_event(
        &self,
        user_id: &str,
        prompt: &str,
        chat_context: &[ConversationTurn],
    ) -> Result<ToolResponse, BridgeError> {
        self.call_tool(
            "add_calendar_event",
            json!({ "user_id": user_id, "prompt": prompt, "chat_context": chat_context }),
        )
        .await
    }

    pub async fn add_event_with_duration(
        &self,
        user_id: &str,
        prompt: &str,
        duration_minutes: i64,
        chat_context: &[ConversationTurn],
    ) -> Result<ToolResponse, BridgeError> {
        self.call_tool(
            "add_calendar_event_with_duration",
            json!({
                "user_id": user_id,
                "prompt": prompt,
                "duration_minutes": duration_minutes,
                "chat_context": chat_context,
            }),
        )
        .await
    }

    pub async fn list_upcoming_events(
        &self,
        user_id: &str,
        max_results: Option<u32>,
    ) -> Result<ToolResponse, BridgeError> {
        let mut arguments = json!({ "user_id": user_id });
        if let (Some(max), Some(obj)) = (max_results, arguments.as_object_mut()) {
            obj.insert("max_results".to_string(), json!(max));
        }
        self.call_tool("list_upcoming_events", arguments).await
    }

    pub async fn respond_to_followup(
        &self,
        user_id: &str,
        original_prompt: &str,
        original_parsed_data: Value,
        followup_response: &str,
    ) -> Result<ToolResponse, BridgeError> {
        self.call_tool(
            "handle_followup_response",
            json!({
                "user_id": user_id,
                "original_prompt": original_prompt,
                "original_parsed_data": original_parsed_data,
                "followup_response": followup_response,
            }),
        )
        .await
    }
}

async fn roundtrip(
    transport: &mut Transport,
    line: &str,
    read_timeout: Duration,
) -> Result<JsonRpcMessage, RoundtripFailure> {
    let writer = transport
        .writer
        .as_mut()
        .ok_or_else(|| RoundtripFailure::Io("writer is closed".to_string()))?;
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|e| RoundtripFailure::Io(e.to_string()))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| RoundtripFailure::Io(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| RoundtripFailure::Io(e.to_string()))?;

    let mut buf = String::new();
    let read = timeout(read_timeout, transport.reader.read_line(&mut buf))
        .await
        .map_err(|_| RoundtripFailure::Timeout)?
        .map_err(|e| RoundtripFailure::Io(e.to_string()))?;
    if read == 0 {
        return Err(RoundtripFailure::Io(
            "worker closed the connection".to_string(),
        ));
    }
    serde_json::from_str(buf.trim_end()).map_err(|e| {
        RoundtripFailure::Malformed(format!("worker sent a malformed message: {e}"))
    })
}

async fn start_worker(spec: &SpawnSpec) -> Result<Transport, BridgeError> {
    let mut last_error = String::new();
    for attempt in 1..=START_ATTEMPTS {
        if attempt > 1 {
            sleep(START_RETRY_BACKOFF).await;
        }
        match start_once(spec).await {
            Ok(transport) => {
                tracing::info!(program = %spec.program, attempt, "worker started");
                return Ok(transport);
            }
            Err(detail) => {
                tracing::warn!(program = %spec.program, attempt, "worker start failed: {detail}");
                last_error = detail;
            }
        }
    }
    Err(BridgeError::Startup(last_error))
}

async fn start_once(spec: &SpawnSpec) -> Result<Transport, String> {
    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .env_clear()
        .envs(create_worker_env(spec.extra_env.clone()))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("could not spawn {}: {e}", spec.program))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| "child stdin was not piped".to_string())?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| "child stdout was not piped".to_string())?;
    let stderr_tail = child.stderr.take().map(tail_stderr);

    // Give the worker a moment to come up; slow cold starts on cloud
    // platforms get a slightly longer window.
    sleep(settle_window()).await;

    match child.try_wait() {
        Ok(Some(status)) => {
            let tail = stderr_tail.map(render_tail).unwrap_or_default();
            Err(format!("worker exited during startup ({status}): {tail}"))
        }
        Err(e) => Err(format!("could not probe worker: {e}")),
        Ok(None) => Ok(Transport {
            reader: Box::new(BufReader::new(stdout)),
            writer: Some(Box::new(stdin)),
            child: Some(child),
            stderr_tail,
        }),
    }
}

fn settle_window() -> Duration {
    if CLOUD_ENV_VARS
        .iter()
        .any(|var| std::env::var_os(var).is_some())
    {
        CLOUD_SETTLE_WINDOW
    } else {
        SETTLE_WINDOW
    }
}

/// Drains worker stderr in the background, keeping the last few lines
/// for post-mortem reporting. Draining also stops the worker from
/// blocking on a full stderr pipe.
fn tail_stderr(stderr: tokio::process::ChildStderr) -> StderrTail {
    let tail: StderrTail = Arc::new(std::sync::Mutex::new(VecDeque::new()));
    let sink = Arc::clone(&tail);
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(target: "worker_stderr", "{line}");
            if let Ok(mut tail) = sink.lock() {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
    });
    tail
}

fn render_tail(tail: StderrTail) -> String {
    match tail.lock() {
        Ok(lines) => lines.iter().cloned().collect::<Vec<_>>().join("\n"),
        Err(_) => String::new(),
    }
}

async fn diagnose_dead_worker(transport: &mut Transport) -> String {
    let status = match transport.child.as_mut() {
        Some(child) => match child.try_wait() {
            Ok(Some(status)) => format!("worker exited with {status}"),
            Ok(None) => "worker is still running".to_string(),
            Err(e) => format!("could not probe worker: {e}"),
        },
        None => "no child process attached".to_string(),
    };
    let tail = transport
        .stderr_tail
        .as_ref()
        .map(|t| render_tail(Arc::clone(t)))
        .unwrap_or_default();
    if tail.is_empty() {
        status
    } else {
        format!("{status}; recent stderr:\n{tail}")
    }
}
