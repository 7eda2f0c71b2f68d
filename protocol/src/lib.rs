//! Wire types for the bridge/worker protocol.
//!
//! The transport is a single ordered byte stream carrying one JSON-RPC
//! message per UTF-8 line. Only requests, responses and error objects
//! exist on this channel; there are no notifications and no pipelining,
//! so every request is answered before the next one is written.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC fault codes used on the wire.
pub const METHOD_NOT_FOUND_ERROR_CODE: i64 = -32601;
pub const INVALID_PARAMS_ERROR_CODE: i64 = -32602;
pub const INTERNAL_ERROR_CODE: i64 = -32603;

/// Methods the worker understands.
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// Correlation key tying a response to its originating request. The
/// bridge only ever generates integer ids; the string form is accepted
/// so a foreign client does not crash the worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Integer(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Integer(i) => write!(f, "{i}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorDetail {
    pub code: i64,
    pub message: String,
}

/// Error object. `id` is `None` (serialized as `null`) when the worker
/// could not even parse the offending request line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    pub error: JsonRpcErrorDetail,
}

/// One line of the wire, either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Error(JsonRpcError),
}

impl JsonRpcMessage {
    pub fn request(id: i64, method: &str, params: Value) -> Self {
        JsonRpcMessage::Request(JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: RequestId::Integer(id),
            method: method.to_string(),
            params: Some(params),
        })
    }

    pub fn response(id: RequestId, result: Value) -> Self {
        JsonRpcMessage::Response(JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        })
    }

    pub fn error(id: Option<RequestId>, code: i64, message: String) -> Self {
        JsonRpcMessage::Error(JsonRpcError {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: JsonRpcErrorDetail { code, message },
        })
    }
}

/// Descriptor returned by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,
}

/// Params of a `tools/call` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
}

/// Result of a `tools/call` request. The worker embeds its JSON result
/// envelope as the first text block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    pub fn text(text: String) -> Self {
        CallToolResult {
            content: vec![ContentBlock::Text { text }],
            is_error: None,
        }
    }

    pub fn error_text(text: String) -> Self {
        CallToolResult {
            content: vec![ContentBlock::Text { text }],
            is_error: Some(true),
        }
    }

    /// The first text block, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().map(|ContentBlock::Text { text }| text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn serialize_request() {
        let msg = JsonRpcMessage::request(1, METHOD_TOOLS_LIST, json!({}));
        let got = match serde_json::to_value(&msg) {
            Ok(v) => v,
            Err(e) => panic!("failed to serialize request: {e}"),
        };
        let expected = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/list",
            "params": {}
        });
        assert_eq!(got, expected);
    }

    #[test]
    fn serialize_error_with_null_id() {
        let msg = JsonRpcMessage::error(None, INTERNAL_ERROR_CODE, "Internal error: bad line".to_string());
        let got = match serde_json::to_value(&msg) {
            Ok(v) => v,
            Err(e) => panic!("failed to serialize error: {e}"),
        };
        let expected = json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": { "code": -32603, "message": "Internal error: bad line" }
        });
        assert_eq!(got, expected);
    }

    #[test]
    fn deserialize_message_variants() {
        let request: JsonRpcMessage = match serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": { "name": "list_upcoming_events", "arguments": { "user_id": "a@b.c" } }
        })) {
            Ok(m) => m,
            Err(e) => panic!("failed to deserialize request: {e}"),
        };
        assert!(matches!(
            request,
            JsonRpcMessage::Request(JsonRpcRequest { id: RequestId::Integer(7), .. })
        ));

        let response: JsonRpcMessage = match serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "result": { "tools": [] }
        })) {
            Ok(m) => m,
            Err(e) => panic!("failed to deserialize response: {e}"),
        };
        assert!(matches!(response, JsonRpcMessage::Response(_)));

        let error: JsonRpcMessage = match serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "error": { "code": -32601, "message": "Method not found: nope" }
        })) {
            Ok(m) => m,
            Err(e) => panic!("failed to deserialize error: {e}"),
        };
        assert!(matches!(error, JsonRpcMessage::Error(_)));
    }

    #[test]
    fn call_tool_result_round_trip() {
        let result = CallToolResult::text("{\"success\":true}".to_string());
        let got = match serde_json::to_value(&result) {
            Ok(v) => v,
            Err(e) => panic!("failed to serialize tool result: {e}"),
        };
        let expected = json!({
            "content": [ { "type": "text", "text": "{\"success\":true}" } ]
        });
        assert_eq!(got, expected);
        assert_eq!(result.first_text(), Some("{\"success\":true}"));
    }
}
