use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use strum::{Display, EnumString};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Role of a conversation turn
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default, ToSchema, TS,
)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Assistant,
    Tool,
}

/// Credential scope the session's tool calls run under
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default, ToSchema, TS,
)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AccountScope {
    #[default]
    Native,
    Assumed,
}

/// Backend health state.
///
/// Health only moves toward `Failed` during operation; it improves
/// exclusively through an explicit re-probe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default, ToSchema, TS,
)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackendHealth {
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Failed,
}

impl BackendHealth {
    /// Whether tools from this backend are offered to the model
    pub fn is_usable(&self) -> bool {
        matches!(self, BackendHealth::Healthy | BackendHealth::Degraded)
    }
}

/// Capability class of a tool backend
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default, ToSchema, TS,
)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CapabilityTag {
    #[default]
    Billing,
    Investigation,
}

/// Outcome of a single tool invocation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default, ToSchema, TS,
)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ToolCallStatus {
    #[default]
    Ok,
    Error,
}

/// A tool call the model requested during a turn.
///
/// `call_id` is unique within the turn; a duplicate is a protocol violation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    pub backend_id: String,
    #[ts(type = "any")]
    pub arguments: JsonValue,
}

/// The correlated result for a [`ToolCallRequest`]
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct ToolCallResult {
    pub call_id: String,
    pub status: ToolCallStatus,
    /// Tool output text when status is ok
    pub payload: Option<String>,
    /// Diagnostic when status is error
    pub error_detail: Option<String>,
}

impl ToolCallResult {
    pub fn ok(call_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            status: ToolCallStatus::Ok,
            payload: Some(payload.into()),
            error_detail: None,
        }
    }

    pub fn error(call_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            status: ToolCallStatus::Error,
            payload: None,
            error_detail: Some(detail.into()),
        }
    }
}

/// One immutable conversation turn.
///
/// Assistant turns may carry tool call descriptors; tool turns carry
/// exactly one correlated result. Causal order is preserved by the
/// session history vector.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    pub tool_result: Option<ToolCallResult>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: None,
            tool_result: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Option<Vec<ToolCallRequest>>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_result: None,
            created_at: Utc::now(),
        }
    }

    pub fn tool(result: ToolCallResult) -> Self {
        Self {
            role: Role::Tool,
            content: String::new(),
            tool_calls: None,
            tool_result: Some(result),
            created_at: Utc::now(),
        }
    }
}

/// Monotonic per-session usage counters.
///
/// `estimated_cost` is recomputed from the token counters on every
/// snapshot, never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default, ToSchema, TS)]
#[ts(export)]
pub struct UsageCounters {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub tool_call_count: u64,
    /// Model round trips
    pub request_count: u64,
    /// USD, recomputed on read from the model's per-token rates
    pub estimated_cost: f64,
}

/// Ordered event emitted while a turn is in flight
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    TextDelta {
        content: String,
    },
    ToolCallAnnounced {
        call_id: String,
        tool_name: String,
        backend_id: String,
    },
    ToolResultReceived {
        call_id: String,
        status: ToolCallStatus,
    },
    TurnComplete {
        truncated: bool,
        steps: usize,
        usage: UsageCounters,
    },
    TurnFailed {
        reason: String,
        detail: Option<String>,
    },
}

impl AgentEvent {
    /// SSE event name for this variant
    pub fn event_name(&self) -> &'static str {
        match self {
            AgentEvent::TextDelta { .. } => "text_delta",
            AgentEvent::ToolCallAnnounced { .. } => "tool_call_announced",
            AgentEvent::ToolResultReceived { .. } => "tool_result_received",
            AgentEvent::TurnComplete { .. } => "turn_complete",
            AgentEvent::TurnFailed { .. } => "turn_failed",
        }
    }
}

// ===== Request/Response DTOs =====

/// Message request from the client
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 10000))]
    pub message: String,
}

/// Session detail view
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct SessionView {
    #[ts(as = "String")]
    pub session_id: Uuid,
    pub history: Vec<Turn>,
    pub usage: UsageCounters,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Catalog entry summary used by the backend view
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
}

/// Backend health and catalog view
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct BackendView {
    pub backend_id: String,
    pub capability: CapabilityTag,
    pub health: BackendHealth,
    pub tools: Vec<ToolSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_event_serializes_with_type_tag() {
        let event = AgentEvent::TextDelta {
            content: "hello".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "text_delta");
        assert_eq!(json["content"], "hello");
        assert_eq!(event.event_name(), "text_delta");
    }

    #[test]
    fn test_agent_event_names_match_serde_tags() {
        let events = vec![
            AgentEvent::ToolCallAnnounced {
                call_id: "c1".into(),
                tool_name: "get_cost".into(),
                backend_id: "billing".into(),
            },
            AgentEvent::ToolResultReceived {
                call_id: "c1".into(),
                status: ToolCallStatus::Ok,
            },
            AgentEvent::TurnComplete {
                truncated: false,
                steps: 1,
                usage: UsageCounters::default(),
            },
            AgentEvent::TurnFailed {
                reason: "cancelled".into(),
                detail: None,
            },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_name());
        }
    }

    #[test]
    fn test_role_round_trips_through_strum() {
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!("tool".parse::<Role>().unwrap(), Role::Tool);
    }

    #[test]
    fn test_backend_health_usability() {
        assert!(BackendHealth::Healthy.is_usable());
        assert!(BackendHealth::Degraded.is_usable());
        assert!(!BackendHealth::Unknown.is_usable());
        assert!(!BackendHealth::Failed.is_usable());
    }

    #[test]
    fn test_tool_call_result_constructors() {
        let ok = ToolCallResult::ok("c1", "42 USD");
        assert_eq!(ok.status, ToolCallStatus::Ok);
        assert_eq!(ok.payload.as_deref(), Some("42 USD"));
        assert!(ok.error_detail.is_none());

        let err = ToolCallResult::error("c2", "timed out");
        assert_eq!(err.status, ToolCallStatus::Error);
        assert!(err.payload.is_none());
        assert_eq!(err.error_detail.as_deref(), Some("timed out"));
    }
}
