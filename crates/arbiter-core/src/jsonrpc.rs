//! Classification of inbound JSON-RPC bodies.
//!
//! Bodies are read into a [`serde_json::Value`] so duplicate keys resolve
//! last-wins, the way the tool server's parser will see them. Whether a body
//! is a tool call depends on `method` alone; a missing or wrong `jsonrpc`
//! version does not exempt it from governance.

use serde_json::{json, Map, Value};

use crate::error::ToolDenied;

pub const TOOLS_CALL: &str = "tools/call";

pub mod error_codes {
    pub const INVALID_REQUEST: i32 = -32600;
    pub const INVALID_PARAMS: i32 = -32602;
    /// Server-defined range: governance denied the tool call.
    pub const TOOL_DENIED: i32 = -32001;
}

/// What the gateway does with one inbound body.
#[derive(Debug, PartialEq)]
pub enum Inbound {
    /// Not JSON, not a request object, or not a tool call. Forwarded untouched.
    Passthrough,
    ToolCall { id: Value, params: CallToolParams },
    /// A tool call that cannot be governed as sent. Answered locally.
    Invalid { id: Value, code: i32, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcRequest {
    pub id: Option<Value>,
    pub method: Option<String>,
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallToolParams {
    pub name: String,
    pub arguments: Value,
}

impl JsonRpcRequest {
    /// `None` unless `body` is a single JSON object.
    pub fn parse(body: &[u8]) -> Option<Self> {
        match serde_json::from_slice::<Value>(body).ok()? {
            Value::Object(obj) => Some(Self::from_object(obj)),
            _ => None,
        }
    }

    fn from_object(mut obj: Map<String, Value>) -> Self {
        Self {
            id: obj.remove("id"),
            method: obj
                .remove("method")
                .and_then(|m| m.as_str().map(str::to_string)),
            params: obj.remove("params").unwrap_or(Value::Null),
        }
    }

    pub fn is_tool_call(&self) -> bool {
        self.method.as_deref() == Some(TOOLS_CALL)
    }

    /// Tool name and arguments; `None` for other methods or when `params.name`
    /// is not a non-empty string.
    pub fn tool_params(&self) -> Option<CallToolParams> {
        if !self.is_tool_call() {
            return None;
        }
        let params = self.params.as_object()?;
        let name = params.get("name")?.as_str().filter(|n| !n.is_empty())?;
        Some(CallToolParams {
            name: name.to_string(),
            arguments: params.get("arguments").cloned().unwrap_or(Value::Null),
        })
    }

    fn classify(self) -> Inbound {
        if !self.is_tool_call() {
            return Inbound::Passthrough;
        }
        match self.tool_params() {
            Some(params) => Inbound::ToolCall {
                id: self.id.unwrap_or(Value::Null),
                params,
            },
            None => Inbound::Invalid {
                id: self.id.unwrap_or(Value::Null),
                code: error_codes::INVALID_PARAMS,
                message: "tools/call requires params.name to be a non-empty string".into(),
            },
        }
    }
}

pub fn classify(body: &[u8]) -> Inbound {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(obj)) => JsonRpcRequest::from_object(obj).classify(),
        Ok(Value::Array(items)) => {
            let batched_call = items
                .iter()
                .any(|item| item.get("method").and_then(Value::as_str) == Some(TOOLS_CALL));
            if batched_call {
                Inbound::Invalid {
                    id: Value::Null,
                    code: error_codes::INVALID_REQUEST,
                    message: "tools/call is not accepted inside a batch".into(),
                }
            } else {
                Inbound::Passthrough
            }
        }
        _ => Inbound::Passthrough,
    }
}

pub fn error_response(id: Value, code: i32, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}

/// Error reply for a denied `tools/call`, echoing the request id.
pub fn denial_response(id: Value, denied: &ToolDenied) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error_codes::TOOL_DENIED,
            "message": denied.to_string(),
            "data": {
                "code": ToolDenied::CODE,
                "decision_id": denied.decision_id,
            }
        }
    })
}
