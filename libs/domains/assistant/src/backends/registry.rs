//! Tool backend registry.
//!
//! Owns the tool catalog, probes backend health, and dispatches
//! invocations. An invocation never returns `Err` into the reasoning
//! loop: every failure mode becomes a status=error [`ToolCallResult`]
//! the model can read and work around.

use observability::AgentMetrics;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::credentials::SessionCredentials;
use crate::error::{AssistantError, AssistantResult};
use crate::models::{BackendHealth, BackendView, CapabilityTag, ToolCallResult, ToolSummary};

use super::client::{BackendClient, BackendTransport};
use super::protocol::ToolDescriptor;

/// Startup/re-probe timeout covering initialize plus tool listing
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Static configuration for one backend
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub backend_id: String,
    pub capability: CapabilityTag,
    pub endpoint: String,
}

struct BackendEntry {
    config: BackendConfig,
    client: Arc<BackendClient>,
    health: BackendHealth,
    tools: Vec<ToolDescriptor>,
}

/// Registry of JSON-RPC tool backends
pub struct ToolBackendRegistry {
    entries: RwLock<HashMap<String, BackendEntry>>,
    call_timeout: Duration,
}

impl ToolBackendRegistry {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            call_timeout,
        }
    }

    /// Register a backend. It starts `Unknown` with an empty catalog
    /// until a probe succeeds.
    pub async fn register(&self, config: BackendConfig, transport: Arc<dyn BackendTransport>) {
        let entry = BackendEntry {
            client: Arc::new(BackendClient::new(transport)),
            health: BackendHealth::Unknown,
            tools: Vec::new(),
            config,
        };
        self.entries
            .write()
            .await
            .insert(entry.config.backend_id.clone(), entry);
    }

    /// Probe every registered backend. One backend's failure never
    /// aborts startup; the session continues with whatever remains.
    pub async fn start_all(&self, credentials: Option<&SessionCredentials>) {
        let backend_ids: Vec<String> = self.entries.read().await.keys().cloned().collect();
        for backend_id in backend_ids {
            if let Err(e) = self.probe(&backend_id, credentials).await {
                warn!(backend_id = %backend_id, error = %e, "Backend failed startup probe");
            }
        }
    }

    /// Explicit (re-)probe: initialize plus tool listing under a short
    /// timeout. This is the only path that improves health.
    pub async fn probe(
        &self,
        backend_id: &str,
        credentials: Option<&SessionCredentials>,
    ) -> AssistantResult<()> {
        let client = {
            let entries = self.entries.read().await;
            let entry = entries.get(backend_id).ok_or_else(|| {
                AssistantError::BackendUnavailable(format!("unknown backend: {backend_id}"))
            })?;
            Arc::clone(&entry.client)
        };

        let probed = timeout(PROBE_TIMEOUT, async {
            client.initialize(credentials).await?;
            client.list_tools(credentials).await
        })
        .await
        .map_err(|_| {
            AssistantError::BackendUnavailable(format!(
                "{backend_id}: probe timed out after {}s",
                PROBE_TIMEOUT.as_secs()
            ))
        })
        .and_then(|result| result);

        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(backend_id).ok_or_else(|| {
            AssistantError::BackendUnavailable(format!("unknown backend: {backend_id}"))
        })?;

        match probed {
            Ok(tools) => {
                info!(backend_id = %backend_id, tools = tools.len(), "Backend probe succeeded");
                AgentMetrics::set_backend_tools(backend_id, tools.len());
                entry.health = BackendHealth::Healthy;
                entry.tools = tools;
                Ok(())
            }
            Err(e) => {
                AgentMetrics::set_backend_tools(backend_id, 0);
                entry.health = BackendHealth::Failed;
                entry.tools.clear();
                Err(e)
            }
        }
    }

    /// Catalog of tools from usable backends, optionally filtered by
    /// capability, as (backend_id, descriptor) pairs
    pub async fn list_tools(
        &self,
        capability: Option<CapabilityTag>,
    ) -> Vec<(String, ToolDescriptor)> {
        let entries = self.entries.read().await;
        let mut tools: Vec<(String, ToolDescriptor)> = entries
            .values()
            .filter(|entry| entry.health.is_usable())
            .filter(|entry| capability.is_none_or(|tag| entry.config.capability == tag))
            .flat_map(|entry| {
                entry
                    .tools
                    .iter()
                    .map(|tool| (entry.config.backend_id.clone(), tool.clone()))
            })
            .collect();
        tools.sort_by(|a, b| (&a.0, &a.1.name).cmp(&(&b.0, &b.1.name)));
        tools
    }

    /// Map a tool name to the backend that serves it
    pub async fn resolve_backend(&self, tool_name: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|entry| entry.health.is_usable())
            .find(|entry| entry.tools.iter().any(|tool| tool.name == tool_name))
            .map(|entry| entry.config.backend_id.clone())
    }

    /// Dispatch one tool invocation.
    ///
    /// Arguments are validated structurally against the tool's declared
    /// schema before dispatch; malformed calls are rejected without
    /// contacting the backend. Transport failures and timeouts degrade
    /// the backend's health.
    pub async fn invoke(
        &self,
        call_id: &str,
        backend_id: &str,
        tool_name: &str,
        arguments: JsonValue,
        credentials: Option<&SessionCredentials>,
    ) -> ToolCallResult {
        let started = Instant::now();

        let (client, schema) = {
            let entries = self.entries.read().await;
            let Some(entry) = entries.get(backend_id) else {
                return self.finish(call_id, backend_id, started, Err(format!(
                    "unknown backend: {backend_id}"
                )));
            };
            if !entry.health.is_usable() {
                return self.finish(call_id, backend_id, started, Err(format!(
                    "backend {backend_id} is {}", entry.health
                )));
            }
            let Some(tool) = entry.tools.iter().find(|tool| tool.name == tool_name) else {
                return self.finish(call_id, backend_id, started, Err(format!(
                    "tool {tool_name} not in {backend_id} catalog"
                )));
            };
            (Arc::clone(&entry.client), tool.input_schema.clone())
        };

        if let Err(detail) = validate_arguments(&schema, &arguments) {
            return self.finish(call_id, backend_id, started, Err(format!(
                "invalid arguments for {tool_name}: {detail}"
            )));
        }

        let outcome = timeout(
            self.call_timeout,
            client.call_tool(tool_name, arguments, credentials),
        )
        .await;

        match outcome {
            Err(_) => {
                self.degrade(backend_id).await;
                self.finish(call_id, backend_id, started, Err(format!(
                    "{tool_name} timed out after {}s", self.call_timeout.as_secs()
                )))
            }
            Ok(Err(AssistantError::BackendUnavailable(detail))) => {
                self.degrade(backend_id).await;
                self.finish(call_id, backend_id, started, Err(detail))
            }
            Ok(Err(e)) => self.finish(call_id, backend_id, started, Err(e.to_string())),
            Ok(Ok(result)) if result.is_error => {
                self.finish(call_id, backend_id, started, Err(result.text()))
            }
            Ok(Ok(result)) => self.finish(call_id, backend_id, started, Ok(result.text())),
        }
    }

    fn finish(
        &self,
        call_id: &str,
        backend_id: &str,
        started: Instant,
        outcome: Result<String, String>,
    ) -> ToolCallResult {
        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(payload) => {
                AgentMetrics::record_tool_call(backend_id, "ok", duration_ms);
                ToolCallResult::ok(call_id, payload)
            }
            Err(detail) => {
                AgentMetrics::record_tool_call(backend_id, "error", duration_ms);
                ToolCallResult::error(call_id, detail)
            }
        }
    }

    /// Transport failure during invocation: healthy backends degrade.
    /// Health never improves here; only [`probe`](Self::probe) does that.
    async fn degrade(&self, backend_id: &str) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(backend_id) {
            if entry.health == BackendHealth::Healthy {
                warn!(backend_id = %backend_id, "Backend degraded after transport failure");
                entry.health = BackendHealth::Degraded;
            }
        }
    }

    /// Health and catalog view for the HTTP surface
    pub async fn views(&self) -> Vec<BackendView> {
        let entries = self.entries.read().await;
        let mut views: Vec<BackendView> = entries
            .values()
            .map(|entry| BackendView {
                backend_id: entry.config.backend_id.clone(),
                capability: entry.config.capability,
                health: entry.health,
                tools: entry
                    .tools
                    .iter()
                    .map(|tool| ToolSummary {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                    })
                    .collect(),
            })
            .collect();
        views.sort_by(|a, b| a.backend_id.cmp(&b.backend_id));
        views
    }

    /// Whether at least one backend can serve tools (readiness)
    pub async fn any_usable(&self) -> bool {
        self.entries
            .read()
            .await
            .values()
            .any(|entry| entry.health.is_usable())
    }
}

/// Structural argument validation against a tool's declared JSON schema:
/// object shape, required keys, and primitive types of declared
/// properties. Anything deeper is the backend's job.
fn validate_arguments(schema: &JsonValue, arguments: &JsonValue) -> Result<(), String> {
    let is_object_schema = schema.get("type").and_then(JsonValue::as_str) == Some("object")
        || schema.get("properties").is_some();
    if !is_object_schema {
        return Ok(());
    }

    let Some(args) = arguments.as_object() else {
        return Err("arguments must be an object".to_string());
    };

    if let Some(required) = schema.get("required").and_then(JsonValue::as_array) {
        for key in required.iter().filter_map(JsonValue::as_str) {
            if !args.contains_key(key) {
                return Err(format!("missing required key: {key}"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(JsonValue::as_object) {
        for (key, value) in args {
            let Some(expected) = properties
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(JsonValue::as_str)
            else {
                continue;
            };
            let matches = match expected {
                "string" => value.is_string(),
                "number" => value.is_number(),
                "integer" => value.is_i64() || value.is_u64(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !matches {
                return Err(format!("key {key} should be of type {expected}"));
            }
        }
    }

    Ok(())
}
