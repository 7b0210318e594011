// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the newline-delimited JSON-RPC 2.0 agent protocol.
//!
//! Every line on the child's stdout is classified as exactly one of: a
//! success response, an error response, a server-initiated request, or a
//! notification. Responses are keyed by our monotonically generated integer
//! ids; server requests echo whatever id the agent chose.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use wireline_core::WirelineError;

/// JSON-RPC methods invoked by the bridge.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "initialized";
    pub const THREAD_START: &str = "thread/start";
    pub const THREAD_RESUME: &str = "thread/resume";
    pub const THREAD_COMPACT_START: &str = "thread/compact/start";
    pub const TURN_START: &str = "turn/start";
    pub const TURN_STEER: &str = "turn/steer";
    pub const TURN_INTERRUPT: &str = "turn/interrupt";
}

/// Notifications received from the agent.
pub mod notices {
    pub const THREAD_STARTED: &str = "thread/started";
    pub const TURN_STARTED: &str = "turn/started";
    pub const TURN_COMPLETED: &str = "turn/completed";
    pub const AGENT_MESSAGE_DELTA: &str = "item/agentMessage/delta";
    pub const ITEM_STARTED: &str = "item/started";
    pub const ITEM_COMPLETED: &str = "item/completed";
}

/// Server-initiated requests received from the agent.
pub mod server_requests {
    pub const COMMAND_APPROVAL: &str = "item/commandExecution/requestApproval";
    pub const FILE_CHANGE_APPROVAL: &str = "item/fileChange/requestApproval";
    pub const TOOL_CALL: &str = "item/tool/call";
}

/// Item type tags inside `item/*` notifications.
pub mod item_types {
    pub const AGENT_MESSAGE: &str = "agentMessage";
    pub const CONTEXT_COMPACTION: &str = "contextCompaction";
}

/// An outbound request line.
#[derive(Debug, Serialize)]
pub struct OutgoingRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: i64,
    pub method: &'a str,
    pub params: Value,
}

/// An outbound notification line.
#[derive(Debug, Serialize)]
pub struct OutgoingNotification<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: Value,
}

/// An outbound success response to a server-initiated request.
#[derive(Debug, Serialize)]
pub struct OutgoingResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    pub result: Value,
}

/// An outbound error response to a server-initiated request.
#[derive(Debug, Serialize)]
pub struct OutgoingErrorResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    pub error: RpcErrorBody,
}

/// The `error` member of a JSON-RPC error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorBody {
    pub fn into_error(self) -> WirelineError {
        WirelineError::Rpc {
            code: self.code,
            message: self.message,
            data: self.data,
        }
    }
}

/// A classified inbound line.
#[derive(Debug, Clone)]
pub enum Incoming {
    /// Response to one of our requests: `Ok(result)` or the error body.
    Response {
        id: i64,
        outcome: Result<Value, RpcErrorBody>,
    },
    /// Server-initiated request we must answer. The id is echoed verbatim.
    ServerRequest {
        id: Value,
        method: String,
        params: Value,
    },
    /// Fire-and-forget notification.
    Notification { method: String, params: Value },
}

/// Classify one line of agent stdout.
pub fn classify(line: &str) -> Result<Incoming, WirelineError> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| WirelineError::Validation(format!("unparseable agent line: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| WirelineError::Validation("agent line is not a JSON object".into()))?;

    let id = obj.get("id");
    let method = obj.get("method").and_then(Value::as_str);

    match (id, method) {
        (Some(id), Some(method)) => Ok(Incoming::ServerRequest {
            id: id.clone(),
            method: method.to_string(),
            params: obj.get("params").cloned().unwrap_or(Value::Null),
        }),
        (None, Some(method)) => Ok(Incoming::Notification {
            method: method.to_string(),
            params: obj.get("params").cloned().unwrap_or(Value::Null),
        }),
        (Some(id), None) => {
            let id = id.as_i64().ok_or_else(|| {
                WirelineError::Validation(format!("response id is not an integer: {id}"))
            })?;
            if let Some(error) = obj.get("error") {
                let body: RpcErrorBody = serde_json::from_value(error.clone()).map_err(|e| {
                    WirelineError::Validation(format!("malformed error response: {e}"))
                })?;
                Ok(Incoming::Response {
                    id,
                    outcome: Err(body),
                })
            } else {
                Ok(Incoming::Response {
                    id,
                    outcome: Ok(obj.get("result").cloned().unwrap_or(Value::Null)),
                })
            }
        }
        (None, None) => Err(WirelineError::Validation(
            "agent line has neither id nor method".into(),
        )),
    }
}

/// `initialize` client info.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo<'a> {
    pub name: &'a str,
    pub version: &'a str,
}

/// One input item of a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub text_elements: Vec<Value>,
}

impl InputItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
            text_elements: Vec::new(),
        }
    }
}

/// Result shape of `thread/start` and `thread/resume`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadResult {
    pub thread_id: String,
}

/// Result shape of `turn/start` and `turn/steer`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    pub turn_id: String,
}

/// Payload of `thread/started`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadStartedNotice {
    pub thread_id: String,
}

/// Payload of `turn/started`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnStartedNotice {
    pub thread_id: String,
    pub turn_id: String,
}

/// Payload of `turn/completed`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnCompletedNotice {
    pub thread_id: String,
    pub turn_id: String,
    pub status: wireline_core::TurnStatus,
    #[serde(default)]
    pub error: Option<String>,
}

/// Payload of `item/agentMessage/delta`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessageDeltaNotice {
    pub thread_id: String,
    pub turn_id: String,
    pub item_id: String,
    pub delta: String,
}

/// Payload of `item/started` and `item/completed`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemNotice {
    pub thread_id: String,
    pub item: ItemPayload,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub turn_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Payload of `item/tool/call`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallParams {
    #[serde(default)]
    pub thread_id: Option<String>,
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}
