//! JSON-RPC client for one tool backend.
//!
//! The transport is a seam so the registry and the reasoning loop can
//! be tested without a live backend. Assumed-scope credentials are
//! forwarded per call as headers; native scope forwards nothing.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::credentials::SessionCredentials;
use crate::error::{AssistantError, AssistantResult};

use super::protocol::{
    CallToolResult, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, RpcRequest, RpcResponse, ToolDescriptor,
    ToolsListResult,
};

pub const HEADER_ACCESS_KEY_ID: &str = "x-aws-access-key-id";
pub const HEADER_SECRET_ACCESS_KEY: &str = "x-aws-secret-access-key";
pub const HEADER_SESSION_TOKEN: &str = "x-aws-session-token";

/// Seam for the HTTP round trip to a backend.
///
/// The credential lifetime is named so the mock can be generated.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BackendTransport: Send + Sync {
    async fn send<'a>(
        &self,
        request: RpcRequest,
        credentials: Option<&'a SessionCredentials>,
    ) -> AssistantResult<RpcResponse>;
}

/// reqwest-based transport posting JSON-RPC to a backend endpoint
pub struct HttpBackendTransport {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpBackendTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> AssistantResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AssistantError::Internal(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl BackendTransport for HttpBackendTransport {
    async fn send<'a>(
        &self,
        request: RpcRequest,
        credentials: Option<&'a SessionCredentials>,
    ) -> AssistantResult<RpcResponse> {
        let mut builder = self.http.post(&self.endpoint).json(&request);

        if let Some(creds) = credentials {
            builder = builder
                .header(HEADER_ACCESS_KEY_ID, &creds.access_key_id)
                .header(HEADER_SECRET_ACCESS_KEY, &creds.secret_access_key)
                .header(HEADER_SESSION_TOKEN, &creds.session_token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AssistantError::BackendUnavailable(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistantError::BackendUnavailable(format!(
                "{}: HTTP {status}",
                self.endpoint
            )));
        }

        response
            .json::<RpcResponse>()
            .await
            .map_err(|e| AssistantError::Protocol(format!("invalid JSON-RPC response: {e}")))
    }
}

/// Typed JSON-RPC operations against one backend
pub struct BackendClient {
    transport: Arc<dyn BackendTransport>,
    next_id: AtomicU64,
}

impl BackendClient {
    pub fn new(transport: Arc<dyn BackendTransport>) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// `initialize` handshake
    pub async fn initialize(
        &self,
        credentials: Option<&SessionCredentials>,
    ) -> AssistantResult<()> {
        let request = RpcRequest::initialize(
            self.next_id(),
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        );
        let response = self.transport.send(request, credentials).await?;
        if let Some(error) = response.error {
            return Err(AssistantError::BackendUnavailable(format!(
                "initialize rejected: {} ({})",
                error.message, error.code
            )));
        }
        Ok(())
    }

    /// `tools/list`
    pub async fn list_tools(
        &self,
        credentials: Option<&SessionCredentials>,
    ) -> AssistantResult<Vec<ToolDescriptor>> {
        let request = RpcRequest::new(self.next_id(), METHOD_TOOLS_LIST, serde_json::json!({}));
        let response = self.transport.send(request, credentials).await?;

        if let Some(error) = response.error {
            return Err(AssistantError::BackendUnavailable(format!(
                "tools/list failed: {} ({})",
                error.message, error.code
            )));
        }

        let result = response.result.ok_or_else(|| {
            AssistantError::Protocol("tools/list response missing result".to_string())
        })?;
        let listed: ToolsListResult = serde_json::from_value(result)
            .map_err(|e| AssistantError::Protocol(format!("invalid tools/list result: {e}")))?;
        Ok(listed.tools)
    }

    /// `tools/call`
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        credentials: Option<&SessionCredentials>,
    ) -> AssistantResult<CallToolResult> {
        let request = RpcRequest::new(
            self.next_id(),
            METHOD_TOOLS_CALL,
            serde_json::json!({
                "name": name,
                "arguments": arguments,
            }),
        );
        let response = self.transport.send(request, credentials).await?;

        if let Some(error) = response.error {
            return Err(AssistantError::ToolInvocation(format!(
                "{name}: {} ({})",
                error.message, error.code
            )));
        }

        let result = response.result.ok_or_else(|| {
            AssistantError::Protocol("tools/call response missing result".to_string())
        })?;
        serde_json::from_value(result)
            .map_err(|e| AssistantError::Protocol(format!("invalid tools/call result: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::protocol::SERVER_ERROR;

    #[tokio::test]
    async fn test_initialize_success() {
        let mut transport = MockBackendTransport::new();
        transport
            .expect_send()
            .withf(|request, creds| request.method == "initialize" && creds.is_none())
            .times(1)
            .returning(|request, _| {
                Ok(RpcResponse::success(
                    request.id,
                    serde_json::json!({"protocolVersion": "2024-11-05"}),
                ))
            });

        let client = BackendClient::new(Arc::new(transport));
        client.initialize(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_tools_parses_catalog() {
        let mut transport = MockBackendTransport::new();
        transport
            .expect_send()
            .withf(|request, _| request.method == "tools/list")
            .returning(|request, _| {
                Ok(RpcResponse::success(
                    request.id,
                    serde_json::json!({
                        "tools": [{
                            "name": "get_cost_and_usage",
                            "description": "Retrieve cost data",
                            "inputSchema": {"type": "object", "properties": {}}
                        }]
                    }),
                ))
            });

        let client = BackendClient::new(Arc::new(transport));
        let tools = client.list_tools(None).await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "get_cost_and_usage");
    }

    #[tokio::test]
    async fn test_call_tool_rpc_error_is_a_tool_invocation_error() {
        let mut transport = MockBackendTransport::new();
        transport.expect_send().returning(|request, _| {
            Ok(RpcResponse::error(
                request.id,
                SERVER_ERROR,
                "throttled by Cost Explorer",
            ))
        });

        let client = BackendClient::new(Arc::new(transport));
        let result = client
            .call_tool("get_cost_and_usage", serde_json::json!({}), None)
            .await;
        assert!(matches!(result, Err(AssistantError::ToolInvocation(_))));
    }

    #[tokio::test]
    async fn test_request_ids_increment() {
        let mut transport = MockBackendTransport::new();
        transport.expect_send().times(2).returning(|request, _| {
            Ok(RpcResponse::success(request.id, serde_json::json!({"tools": []})))
        });

        let client = BackendClient::new(Arc::new(transport));
        client.list_tools(None).await.unwrap();
        client.list_tools(None).await.unwrap();
        assert_eq!(client.next_id.load(Ordering::Relaxed), 3);
    }
}
