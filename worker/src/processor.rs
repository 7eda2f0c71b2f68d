//! Request dispatch. One incoming request maps to exactly one outgoing
//! message.

use calpal_core::response::ToolResponse;
use calpal_protocol::CallToolParams;
use calpal_protocol::CallToolResult;
use calpal_protocol::JsonRpcMessage;
use calpal_protocol::JsonRpcRequest;
use calpal_protocol::ListToolsResult;
use calpal_protocol::RequestId;
use calpal_protocol::INTERNAL_ERROR_CODE;
use calpal_protocol::INVALID_PARAMS_ERROR_CODE;
use calpal_protocol::METHOD_NOT_FOUND_ERROR_CODE;
use calpal_protocol::METHOD_TOOLS_CALL;
use calpal_protocol::METHOD_TOOLS_LIST;
use serde_json::json;
use serde_json::Value;

use crate::handlers::CalendarService;
use crate::tools;
use crate::tools::AddEventArgs;
use crate::tools::AddEventWithDurationArgs;
use crate::tools::FollowupArgs;
use crate::tools::ListUpcomingArgs;

pub struct MessageProcessor {
    service: CalendarService,
}

impl MessageProcessor {
    pub fn new(service: CalendarService) -> Self {
        MessageProcessor { service }
    }

    pub async fn process_request(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        tracing::debug!(id = %request.id, method = %request.method, "processing request");
        match request.method.as_str() {
            METHOD_TOOLS_LIST => self.handle_tools_list(request.id),
            METHOD_TOOLS_CALL => self.handle_tools_call(request.id, request.params).await,
            other => JsonRpcMessage::error(
                Some(request.id),
                METHOD_NOT_FOUND_ERROR_CODE,
                format!("Method not found: {other}"),
            ),
        }
    }

    fn handle_tools_list(&self, id: RequestId) -> JsonRpcMessage {
        let result = ListToolsResult {
            tools: tools::tool_descriptors(),
        };
        match serde_json::to_value(result) {
            Ok(value) => JsonRpcMessage::response(id, value),
            Err(e) => internal_error(id, e),
        }
    }

    async fn handle_tools_call(&self, id: RequestId, params: Option<Value>) -> JsonRpcMessage {
        let params: CallToolParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return JsonRpcMessage::error(
                    Some(id),
                    INVALID_PARAMS_ERROR_CODE,
                    format!("Invalid params: {e}"),
                );
            }
            None => {
                return JsonRpcMessage::error(
                    Some(id),
                    INVALID_PARAMS_ERROR_CODE,
                    "Invalid params: missing".to_string(),
                );
            }
        };
        let result = self
            .dispatch_tool(&params.name, params.arguments.unwrap_or_else(|| json!({})))
            .await;
        match serde_json::to_value(result) {
            Ok(value) => JsonRpcMessage::response(id, value),
            Err(e) => internal_error(id, e),
        }
    }

    async fn dispatch_tool(&self, name: &str, arguments: Value) -> CallToolResult {
        match name {
            tools::TOOL_ADD_EVENT => match serde_json::from_value::<AddEventArgs>(arguments) {
                Ok(args) => envelope(
                    self.service
                        .add_event(&args.user_id, &args.prompt, &args.chat_context)
                        .await,
                ),
                Err(e) => bad_arguments(name, e),
            },
            tools::TOOL_ADD_EVENT_WITH_DURATION => {
                match serde_json::from_value::<AddEventWithDurationArgs>(arguments) {
                    Ok(args) => envelope(
                        self.service
                            .add_event_with_duration(
                                &args.user_id,
                                &args.prompt,
                                args.duration_minutes,
                                &args.chat_context,
                            )
                            .await,
                    ),
                    Err(e) => bad_arguments(name, e),
                }
            }
            tools::TOOL_LIST_UPCOMING => {
                match serde_json::from_value::<ListUpcomingArgs>(arguments) {
                    Ok(args) => envelope(
                        self.service
                            .list_upcoming(&args.user_id, args.max_results)
                            .await,
                    ),
                    Err(e) => bad_arguments(name, e),
                }
            }
            tools::TOOL_HANDLE_FOLLOWUP => {
                match serde_json::from_value::<FollowupArgs>(arguments) {
                    Ok(args) => envelope(
                        self.service
                            .handle_followup(
                                &args.user_id,
                                &args.original_prompt,
                                args.original_parsed_data,
                                &args.followup_response,
                            )
                            .await,
                    ),
                    Err(e) => bad_arguments(name, e),
                }
            }
            unknown => error_envelope(ToolResponse::error(format!("Unknown tool: {unknown}"))),
        }
    }
}

fn envelope(response: ToolResponse) -> CallToolResult {
    match serde_json::to_string(&response) {
        Ok(text) => CallToolResult::text(text),
        Err(e) => CallToolResult::error_text(format!("Internal error: {e}")),
    }
}

fn error_envelope(response: ToolResponse) -> CallToolResult {
    match serde_json::to_string(&response) {
        Ok(text) => CallToolResult::error_text(text),
        Err(e) => CallToolResult::error_text(format!("Internal error: {e}")),
    }
}

fn bad_arguments(tool: &str, e: serde_json::Error) -> CallToolResult {
    error_envelope(ToolResponse::error(format!(
        "Invalid arguments for {tool}: {e}"
    )))
}

fn internal_error(id: RequestId, e: serde_json::Error) -> JsonRpcMessage {
    JsonRpcMessage::error(Some(id), INTERNAL_ERROR_CODE, format!("Internal error: {e}"))
}
