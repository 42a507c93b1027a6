//! Streaming model client.
//!
//! [`ModelClient`] is the seam the orchestrator reasons against;
//! [`AnthropicClient`] implements it over the Messages SSE API. The
//! stream is normalized into [`ModelEvent`]s: text deltas as they
//! arrive, fully assembled tool calls, then usage and a stop marker.

use async_stream::stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use crate::backends::ToolDescriptor;
use crate::config::AgentConfig;
use crate::error::{AssistantError, AssistantResult};
use crate::models::{Role, Turn};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Normalized event from one model round trip
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    TextDelta(String),
    /// A tool call with its input fully assembled
    ToolUse {
        call_id: String,
        tool_name: String,
        arguments: JsonValue,
    },
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
    Stop,
}

pub type ModelEventStream = Pin<Box<dyn Stream<Item = AssistantResult<ModelEvent>> + Send>>;

/// Seam for the model round trip
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn stream_turn(
        &self,
        system_prompt: &str,
        history: &[Turn],
        tools: &[ToolDescriptor],
    ) -> AssistantResult<ModelEventStream>;
}

/// Anthropic Messages API client with SSE streaming
pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model_id: String,
    max_tokens: u32,
    /// Bound on silence between SSE frames, not on the whole stream
    idle_timeout: Duration,
}

impl AnthropicClient {
    pub fn new(config: &AgentConfig) -> AssistantResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AssistantError::Internal(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            base_url: config.anthropic_base_url.trim_end_matches('/').to_string(),
            api_key: config.anthropic_api_key.clone(),
            model_id: config.model_id.clone(),
            max_tokens: config.model_max_tokens,
            idle_timeout: Duration::from_secs(config.model_timeout_secs),
        })
    }

    /// Project session history into Messages API shape. Assistant turns
    /// become text plus `tool_use` blocks; consecutive tool turns merge
    /// into one user message of `tool_result` blocks.
    fn build_messages(history: &[Turn]) -> Vec<JsonValue> {
        let mut messages = Vec::new();
        let mut pending_results: Vec<JsonValue> = Vec::new();

        for turn in history {
            if turn.role != Role::Tool && !pending_results.is_empty() {
                messages.push(json!({
                    "role": "user",
                    "content": std::mem::take(&mut pending_results),
                }));
            }

            match turn.role {
                Role::User => messages.push(json!({
                    "role": "user",
                    "content": turn.content,
                })),
                Role::Assistant => {
                    let mut blocks = Vec::new();
                    if !turn.content.is_empty() {
                        blocks.push(json!({"type": "text", "text": turn.content}));
                    }
                    for call in turn.tool_calls.iter().flatten() {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": call.call_id,
                            "name": call.tool_name,
                            "input": call.arguments,
                        }));
                    }
                    messages.push(json!({"role": "assistant", "content": blocks}));
                }
                Role::Tool => {
                    if let Some(result) = &turn.tool_result {
                        let is_error = result.error_detail.is_some();
                        let content = result
                            .payload
                            .clone()
                            .or_else(|| result.error_detail.clone())
                            .unwrap_or_default();
                        pending_results.push(json!({
                            "type": "tool_result",
                            "tool_use_id": result.call_id,
                            "content": content,
                            "is_error": is_error,
                        }));
                    }
                }
            }
        }

        if !pending_results.is_empty() {
            messages.push(json!({
                "role": "user",
                "content": pending_results,
            }));
        }

        messages
    }

    fn build_body(&self, system_prompt: &str, history: &[Turn], tools: &[ToolDescriptor]) -> JsonValue {
        let mut body = json!({
            "model": self.model_id,
            "max_tokens": self.max_tokens,
            "stream": true,
            "system": system_prompt,
            "messages": Self::build_messages(history),
        });
        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.input_schema,
                    })
                })
                .collect();
        }
        body
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn stream_turn(
        &self,
        system_prompt: &str,
        history: &[Turn],
        tools: &[ToolDescriptor],
    ) -> AssistantResult<ModelEventStream> {
        let body = self.build_body(system_prompt, history, tools);

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Model(format!("model request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AssistantError::Model(format!(
                "model returned HTTP {status}: {detail}"
            )));
        }

        let idle_timeout = self.idle_timeout;
        let stream = stream! {
            let mut events = response.bytes_stream().eventsource();
            // Tool input JSON arrives in fragments keyed by block index
            let mut tool_blocks: HashMap<u64, ToolUseBuffer> = HashMap::new();
            let mut usage = WireUsage::default();

            loop {
                let next = match timeout(idle_timeout, events.next()).await {
                    Ok(item) => item,
                    Err(_) => {
                        yield Err(AssistantError::Model(format!(
                            "model stream idle for {}s",
                            idle_timeout.as_secs()
                        )));
                        return;
                    }
                };

                let Some(event) = next else {
                    yield Err(AssistantError::Model(
                        "model stream ended without message_stop".to_string(),
                    ));
                    return;
                };
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(AssistantError::Model(format!("model stream error: {e}")));
                        return;
                    }
                };

                match event.event.as_str() {
                    "message_start" => {
                        if let Ok(start) = serde_json::from_str::<MessageStart>(&event.data) {
                            usage.merge(&start.message.usage);
                        }
                    }
                    "content_block_start" => {
                        if let Ok(start) = serde_json::from_str::<ContentBlockStart>(&event.data) {
                            if start.content_block.kind == "tool_use" {
                                tool_blocks.insert(
                                    start.index,
                                    ToolUseBuffer {
                                        call_id: start.content_block.id,
                                        tool_name: start.content_block.name,
                                        input_json: String::new(),
                                    },
                                );
                            }
                        }
                    }
                    "content_block_delta" => {
                        let Ok(delta) = serde_json::from_str::<ContentBlockDelta>(&event.data)
                        else {
                            continue;
                        };
                        match delta.delta.kind.as_str() {
                            "text_delta" => {
                                yield Ok(ModelEvent::TextDelta(delta.delta.text));
                            }
                            "input_json_delta" => {
                                if let Some(buffer) = tool_blocks.get_mut(&delta.index) {
                                    buffer.input_json.push_str(&delta.delta.partial_json);
                                }
                            }
                            _ => {}
                        }
                    }
                    "content_block_stop" => {
                        let Ok(stop) = serde_json::from_str::<ContentBlockStop>(&event.data)
                        else {
                            continue;
                        };
                        if let Some(buffer) = tool_blocks.remove(&stop.index) {
                            match buffer.finalize() {
                                Ok(model_event) => yield Ok(model_event),
                                Err(e) => {
                                    yield Err(e);
                                    return;
                                }
                            }
                        }
                    }
                    "message_delta" => {
                        if let Ok(delta) = serde_json::from_str::<MessageDelta>(&event.data) {
                            usage.merge(&delta.usage);
                        }
                    }
                    "message_stop" => {
                        yield Ok(ModelEvent::Usage {
                            input_tokens: usage.input_tokens,
                            output_tokens: usage.output_tokens,
                        });
                        yield Ok(ModelEvent::Stop);
                        return;
                    }
                    "error" => {
                        let detail = serde_json::from_str::<WireError>(&event.data)
                            .map(|e| e.error.message)
                            .unwrap_or(event.data);
                        yield Err(AssistantError::Model(detail));
                        return;
                    }
                    other => {
                        debug!(event = %other, "Ignoring model stream event");
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

struct ToolUseBuffer {
    call_id: String,
    tool_name: String,
    input_json: String,
}

impl ToolUseBuffer {
    /// Assemble the buffered fragments; an empty buffer means the tool
    /// takes no arguments.
    fn finalize(self) -> AssistantResult<ModelEvent> {
        let arguments = if self.input_json.is_empty() {
            json!({})
        } else {
            serde_json::from_str(&self.input_json).map_err(|e| {
                AssistantError::Protocol(format!(
                    "invalid tool input JSON for {}: {e}",
                    self.tool_name
                ))
            })?
        };
        Ok(ModelEvent::ToolUse {
            call_id: self.call_id,
            tool_name: self.tool_name,
            arguments,
        })
    }
}

// ===== Wire shapes (deserialization only) =====

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl WireUsage {
    /// Later frames carry partial usage; nonzero fields win
    fn merge(&mut self, other: &WireUsage) {
        if other.input_tokens > 0 {
            self.input_tokens = other.input_tokens;
        }
        if other.output_tokens > 0 {
            self.output_tokens = other.output_tokens;
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    message: MessageStartInner,
}

#[derive(Debug, Deserialize)]
struct MessageStartInner {
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlockStart {
    index: u64,
    content_block: WireContentBlock,
}

#[derive(Debug, Deserialize)]
struct WireContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ContentBlockDelta {
    index: u64,
    delta: WireDelta,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    partial_json: String,
}

#[derive(Debug, Deserialize)]
struct ContentBlockStop {
    index: u64,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: WireErrorInner,
}

#[derive(Debug, Deserialize)]
struct WireErrorInner {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ToolCallRequest, ToolCallResult};

    #[test]
    fn test_build_messages_simple_exchange() {
        let history = vec![Turn::user("what did EC2 cost last week?")];
        let messages = AnthropicClient::build_messages(&history);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "what did EC2 cost last week?");
    }

    #[test]
    fn test_build_messages_assistant_with_tool_use() {
        let history = vec![
            Turn::user("check costs"),
            Turn::assistant(
                "Let me look.",
                Some(vec![ToolCallRequest {
                    call_id: "toolu_1".to_string(),
                    tool_name: "get_cost_and_usage".to_string(),
                    backend_id: "billing".to_string(),
                    arguments: json!({"days": 7}),
                }]),
            ),
        ];
        let messages = AnthropicClient::build_messages(&history);
        assert_eq!(messages.len(), 2);

        let blocks = messages[1]["content"].as_array().unwrap();
        assert_eq!(blocks[0]["type"], "text");
        assert_eq!(blocks[1]["type"], "tool_use");
        assert_eq!(blocks[1]["id"], "toolu_1");
        assert_eq!(blocks[1]["input"]["days"], 7);
    }

    #[test]
    fn test_build_messages_merges_consecutive_tool_results() {
        let history = vec![
            Turn::user("check two things"),
            Turn::assistant(
                "",
                Some(vec![
                    ToolCallRequest {
                        call_id: "toolu_1".to_string(),
                        tool_name: "get_cost_and_usage".to_string(),
                        backend_id: "billing".to_string(),
                        arguments: json!({}),
                    },
                    ToolCallRequest {
                        call_id: "toolu_2".to_string(),
                        tool_name: "get_budgets".to_string(),
                        backend_id: "billing".to_string(),
                        arguments: json!({}),
                    },
                ]),
            ),
            Turn::tool(ToolCallResult::ok("toolu_1", "$10.00")),
            Turn::tool(ToolCallResult::error("toolu_2", "throttled")),
        ];
        let messages = AnthropicClient::build_messages(&history);
        assert_eq!(messages.len(), 3);

        // Both results land in one user message
        let results = messages[2]["content"].as_array().unwrap();
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["tool_use_id"], "toolu_1");
        assert_eq!(results[0]["is_error"], false);
        assert_eq!(results[1]["tool_use_id"], "toolu_2");
        assert_eq!(results[1]["is_error"], true);
        assert_eq!(results[1]["content"], "throttled");
    }

    #[test]
    fn test_build_messages_empty_assistant_text_is_skipped() {
        let history = vec![Turn::assistant(
            "",
            Some(vec![ToolCallRequest {
                call_id: "toolu_1".to_string(),
                tool_name: "get_budgets".to_string(),
                backend_id: "billing".to_string(),
                arguments: json!({}),
            }]),
        )];
        let messages = AnthropicClient::build_messages(&history);
        let blocks = messages[0]["content"].as_array().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0]["type"], "tool_use");
    }

    #[test]
    fn test_tool_buffer_empty_input_becomes_empty_object() {
        let buffer = ToolUseBuffer {
            call_id: "toolu_1".to_string(),
            tool_name: "get_budgets".to_string(),
            input_json: String::new(),
        };
        let event = buffer.finalize().unwrap();
        assert_eq!(
            event,
            ModelEvent::ToolUse {
                call_id: "toolu_1".to_string(),
                tool_name: "get_budgets".to_string(),
                arguments: json!({}),
            }
        );
    }

    #[test]
    fn test_tool_buffer_rejects_malformed_fragments() {
        let buffer = ToolUseBuffer {
            call_id: "toolu_1".to_string(),
            tool_name: "get_budgets".to_string(),
            input_json: "{\"days\": ".to_string(),
        };
        assert!(matches!(
            buffer.finalize(),
            Err(AssistantError::Protocol(_))
        ));
    }

    #[test]
    fn test_usage_merge_keeps_nonzero_fields() {
        let mut usage = WireUsage::default();
        usage.merge(&WireUsage {
            input_tokens: 120,
            output_tokens: 0,
        });
        usage.merge(&WireUsage {
            input_tokens: 0,
            output_tokens: 85,
        });
        assert_eq!(usage.input_tokens, 120);
        assert_eq!(usage.output_tokens, 85);
    }
}
