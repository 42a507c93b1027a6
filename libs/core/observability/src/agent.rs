//! Agent-specific metrics for the FinOps assistant.

use metrics::{counter, gauge, histogram};

/// Agent metrics recorder
pub struct AgentMetrics;

impl AgentMetrics {
    // =========================================================================
    // Turn Metrics
    // =========================================================================

    /// Record a successfully completed turn
    pub fn record_turn_completed(truncated: bool, steps: usize) {
        let outcome = if truncated { "truncated" } else { "ok" };
        counter!("agent_turns_total", "outcome" => outcome).increment(1);
        histogram!("agent_turn_steps").record(steps as f64);
    }

    /// Record a failed turn
    pub fn record_turn_failed(reason: &'static str) {
        counter!("agent_turns_total", "outcome" => "failed", "reason" => reason).increment(1);
    }

    /// Set the number of sessions currently held in memory
    pub fn set_active_sessions(count: usize) {
        gauge!("agent_active_sessions").set(count as f64);
    }

    // =========================================================================
    // Model Metrics
    // =========================================================================

    /// Record one model streaming round trip
    pub fn record_model_request(outcome: &'static str, duration_ms: u64) {
        counter!("model_requests_total", "outcome" => outcome).increment(1);
        histogram!("model_request_duration_seconds").record(duration_ms as f64 / 1000.0);
    }

    /// Record token consumption reported by the model
    pub fn record_tokens(input_tokens: u64, output_tokens: u64) {
        counter!("model_tokens_total", "direction" => "input").increment(input_tokens);
        counter!("model_tokens_total", "direction" => "output").increment(output_tokens);
    }

    // =========================================================================
    // Tool Backend Metrics
    // =========================================================================

    /// Record a tool invocation
    pub fn record_tool_call(backend_id: &str, status: &'static str, duration_ms: u64) {
        counter!(
            "tool_calls_total",
            "backend" => backend_id.to_string(),
            "status" => status
        )
        .increment(1);
        histogram!("tool_call_duration_seconds", "backend" => backend_id.to_string())
            .record(duration_ms as f64 / 1000.0);
    }

    /// Set the catalog size for a backend
    pub fn set_backend_tools(backend_id: &str, count: usize) {
        gauge!("backend_tools_available", "backend" => backend_id.to_string())
            .set(count as f64);
    }

    // =========================================================================
    // Credential Metrics
    // =========================================================================

    /// Record an assume-role refresh attempt
    pub fn record_credential_refresh(outcome: &'static str) {
        counter!("credential_refreshes_total", "outcome" => outcome).increment(1);
    }
}
