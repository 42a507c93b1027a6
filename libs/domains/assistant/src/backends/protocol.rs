//! MCP-style JSON-RPC 2.0 wire types.
//!
//! Backends speak JSON-RPC over HTTP: `initialize`, `tools/list`, and
//! `tools/call`. Only the subset the registry needs is modeled here.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

// JSON-RPC error codes
pub const PARSE_ERROR: i32 = -32700;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const SERVER_ERROR: i32 = -32000;

/// JSON-RPC request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: JsonValue,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: JsonValue) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    /// The `initialize` handshake request
    pub fn initialize(id: u64, client_name: &str, client_version: &str) -> Self {
        Self::new(
            id,
            METHOD_INITIALIZE,
            serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": client_name,
                    "version": client_version,
                }
            }),
        )
    }
}

/// JSON-RPC response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: u64, result: JsonValue) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(serde_json::json!(id)),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: u64, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(serde_json::json!(id)),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

/// One catalog entry from `tools/list`.
///
/// The same shape is forwarded to the model as its tool definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: JsonValue,
}

/// Result of `tools/list`
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsListResult {
    pub tools: Vec<ToolDescriptor>,
}

/// Content item inside a `tools/call` result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    Text { text: String },
    #[serde(other)]
    Unknown,
}

/// Result of `tools/call`
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Concatenated text content
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| match item {
                ContentItem::Text { text } => Some(text.as_str()),
                ContentItem::Unknown => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_request_shape() {
        let request = RpcRequest::initialize(1, "finops-assistant", "0.1.0");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["method"], "initialize");
        assert_eq!(json["params"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(json["params"]["clientInfo"]["name"], "finops-assistant");
    }

    #[test]
    fn test_tool_descriptor_uses_input_schema_key() {
        let raw = serde_json::json!({
            "name": "get_cost_and_usage",
            "description": "Retrieve cost and usage data",
            "inputSchema": {
                "type": "object",
                "properties": {"days": {"type": "integer"}},
                "required": ["days"]
            }
        });
        let descriptor: ToolDescriptor = serde_json::from_value(raw).unwrap();
        assert_eq!(descriptor.name, "get_cost_and_usage");
        assert_eq!(descriptor.input_schema["required"][0], "days");
    }

    #[test]
    fn test_call_result_text_extraction() {
        let raw = serde_json::json!({
            "content": [
                {"type": "text", "text": "line one"},
                {"type": "image", "data": "..."},
                {"type": "text", "text": "line two"}
            ]
        });
        let result: CallToolResult = serde_json::from_value(raw).unwrap();
        assert!(!result.is_error);
        assert_eq!(result.text(), "line one\nline two");
    }

    #[test]
    fn test_call_result_error_flag() {
        let raw = serde_json::json!({
            "content": [{"type": "text", "text": "boom"}],
            "isError": true
        });
        let result: CallToolResult = serde_json::from_value(raw).unwrap();
        assert!(result.is_error);
    }

    #[test]
    fn test_rpc_error_round_trip() {
        let response = RpcResponse::error(7, METHOD_NOT_FOUND, "no such method");
        let json = serde_json::to_string(&response).unwrap();
        let parsed: RpcResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.error.unwrap().code, METHOD_NOT_FOUND);
        assert!(parsed.result.is_none());
    }
}
