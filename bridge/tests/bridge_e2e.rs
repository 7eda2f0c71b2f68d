#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;
use std::time::Instant;

use calpal_bridge::BridgeError;
use calpal_bridge::WorkerBridge;
use pretty_assertions::assert_eq;
use serde_json::json;
use serde_json::Value;
use tokio::io::duplex;
use tokio::io::split;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::io::DuplexStream;

/// Drives the worker side of the wire with a closure that maps each
/// request line to zero or more response lines.
fn scripted_worker<F>(stream: DuplexStream, mut respond: F)
where
    F: FnMut(Value) -> Vec<String> + Send + 'static,
{
    tokio::spawn(async move {
        let (read_half, mut write_half) = split(stream);
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let request: Value = serde_json::from_str(&line).expect("worker got valid JSON");
            for reply in respond(request) {
                write_half.write_all(reply.as_bytes()).await.expect("write reply");
                write_half.write_all(b"\n").await.expect("write newline");
            }
        }
    });
}

fn bridge_over(stream: DuplexStream) -> WorkerBridge {
    let (reader, writer) = split(stream);
    WorkerBridge::with_streams(reader, writer)
}

#[tokio::test]
async fn responses_correlate_by_id_even_when_slow() {
    let (near, far) = duplex(1 << 16);
    scripted_worker(far, |request| {
        let id = request["id"].clone();
        let first = id == json!(1);
        let reply = json!({ "jsonrpc": "2.0", "id": id, "result": { "echo": request["method"] } });
        if first {
            // Delay the first response; the caller must still pair it
            // with the first request.
            std::thread::sleep(Duration::from_millis(50));
        }
        vec![reply.to_string()]
    });

    let bridge = bridge_over(near);
    let first = bridge.invoke("tools/list", json!({})).await.expect("first invoke");
    assert_eq!(first, json!({ "echo": "tools/list" }));
    let second = bridge.invoke("tools/call", json!({})).await.expect("second invoke");
    assert_eq!(second, json!({ "echo": "tools/call" }));
}

#[tokio::test]
async fn mismatched_response_id_is_a_protocol_error() {
    let (near, far) = duplex(1 << 16);
    scripted_worker(far, |_| {
        vec![json!({ "jsonrpc": "2.0", "id": 99, "result": {} }).to_string()]
    });

    let bridge = bridge_over(near);
    let err = bridge.invoke("tools/list", json!({})).await.expect_err("must fail");
    assert!(matches!(err, BridgeError::Protocol(_)), "got {err:?}");
}

#[tokio::test]
async fn worker_error_object_becomes_worker_error() {
    let (near, far) = duplex(1 << 16);
    scripted_worker(far, |request| {
        vec![json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": { "code": -32601, "message": "Method not found: nope" }
        })
        .to_string()]
    });

    let bridge = bridge_over(near);
    let err = bridge.invoke("nope", json!({})).await.expect_err("must fail");
    match err {
        BridgeError::Worker { code, message } => {
            assert_eq!(code, -32601);
            assert_eq!(message, "Method not found: nope");
        }
        other => panic!("expected worker error, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_reply_fails_the_call_but_not_the_worker() {
    let (near, far) = duplex(1 << 16);
    scripted_worker(far, |request| {
        if request["id"] == json!(1) {
            vec!["this is not json".to_string()]
        } else {
            vec![json!({ "jsonrpc": "2.0", "id": request["id"], "result": { "ok": true } })
                .to_string()]
        }
    });

    let bridge = bridge_over(near);
    let err = bridge.invoke("tools/list", json!({})).await.expect_err("must fail");
    assert!(matches!(err, BridgeError::Communication(_)), "got {err:?}");

    // The transport survives; the next call goes through.
    let result = bridge.invoke("tools/list", json!({})).await.expect("second invoke");
    assert_eq!(result, json!({ "ok": true }));
}

#[tokio::test]
async fn eof_is_a_communication_error() {
    let (near, far) = duplex(1 << 16);
    drop(far);
    let bridge = bridge_over(near);
    let err = bridge.invoke("tools/list", json!({})).await.expect_err("must fail");
    assert!(matches!(err, BridgeError::Communication(_)), "got {err:?}");
}

#[tokio::test]
async fn silent_worker_times_out_within_the_deadline() {
    let (near, far) = duplex(1 << 16);
    scripted_worker(far, |_| Vec::new());

    let deadline = Duration::from_millis(100);
    let bridge = bridge_over(near).with_read_timeout(deadline);
    let started = Instant::now();
    let err = bridge.invoke("tools/list", json!({})).await.expect_err("must time out");
    assert!(matches!(err, BridgeError::Timeout(_)), "got {err:?}");
    assert!(started.elapsed() < deadline + Duration::from_secs(1));

    // Stream bridges have nothing to respawn, so the transport stays
    // closed afterwards.
    let err = bridge.invoke("tools/list", json!({})).await.expect_err("must stay dead");
    assert!(matches!(err, BridgeError::Communication(_)), "got {err:?}");
}

#[tokio::test]
async fn call_tool_unwraps_the_text_envelope() {
    let (near, far) = duplex(1 << 16);
    scripted_worker(far, |request| {
        assert_eq!(request["method"], json!("tools/call"));
        assert_eq!(request["params"]["name"], json!("list_upcoming_events"));
        let envelope = json!({ "success": true, "events": [] }).to_string();
        vec![json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": { "content": [ { "type": "text", "text": envelope } ] }
        })
        .to_string()]
    });

    let bridge = bridge_over(near);
    let response = bridge
        .list_upcoming_events("a@b.c", None)
        .await
        .expect("call succeeds");
    assert!(response.success);
    assert_eq!(response.events, Some(Vec::new()));
}

#[tokio::test]
async fn stop_is_idempotent() {
    let (near, far) = duplex(1 << 16);
    scripted_worker(far, |_| Vec::new());
    let bridge = bridge_over(near);
    bridge.stop().await;
    bridge.stop().await;
    let err = bridge.invoke("tools/list", json!({})).await.expect_err("stopped");
    assert!(matches!(err, BridgeError::Communication(_)), "got {err:?}");
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn spawns_a_real_process_and_times_out_against_it() {
    // `cat` echoes our request back; an echoed request is not a valid
    // response, which proves spawn, settle and framing work end to end.
    let bridge = WorkerBridge::spawn("/bin/cat", &[], None)
        .await
        .expect("cat spawns")
        .with_read_timeout(Duration::from_secs(5));
    let err = bridge.invoke("tools/list", json!({})).await.expect_err("echo is not a response");
    assert!(matches!(err, BridgeError::Protocol(_)), "got {err:?}");
    bridge.stop().await;
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn invoke_after_timeout_reaches_a_fresh_worker() {
    // First instance leaves a marker and hangs without answering, so
    // the first invoke times out. The respawned instance finds the
    // marker and answers every request, proving the second invoke went
    // to a new process over a new transport.
    let marker = std::env::temp_dir().join(format!("calpal-bridge-respawn-{}", std::process::id()));
    let _ = std::fs::remove_file(&marker);
    let script = r#"
if [ -e "$1" ]; then
    while read -r line; do
        id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
        printf '{"jsonrpc":"2.0","id":%s,"result":{"fresh":true}}\n' "$id"
    done
else
    : > "$1"
    read -r line
    sleep 60
fi
"#;
    let marker_arg = marker.to_string_lossy().into_owned();
    let bridge = WorkerBridge::spawn("/bin/sh", &["-c", script, "sh", &marker_arg], None)
        .await
        .expect("shell worker spawns")
        .with_read_timeout(Duration::from_secs(2));

    let err = bridge.invoke("tools/list", json!({})).await.expect_err("first worker hangs");
    assert!(matches!(err, BridgeError::Timeout(_)), "got {err:?}");

    let result = bridge
        .invoke("tools/list", json!({}))
        .await
        .expect("second invoke reaches the respawned worker");
    assert_eq!(result, json!({ "fresh": true }));

    bridge.stop().await;
    let _ = std::fs::remove_file(&marker);
}
