//! Observability utilities for the FinOps assistant platform.
//!
//! This crate provides:
//! - Prometheus metrics recording and export
//! - Custom metrics for agent turns, model calls, and tool backends
//! - Axum middleware for automatic request metrics
//!
//! # Example
//!
//! ```rust,ignore
//! use observability::{init_metrics, metrics_handler, AgentMetrics};
//!
//! // Initialize metrics recorder
//! init_metrics();
//!
//! // Record agent activity
//! AgentMetrics::record_turn_completed(false, 2);
//! AgentMetrics::record_tool_call("billing", "ok", 152);
//!
//! // Add metrics endpoint to router
//! let app = Router::new()
//!     .route("/metrics", get(metrics_handler));
//! ```

pub mod agent;
pub mod middleware;

pub use agent::AgentMetrics;
pub use middleware::metrics_middleware;

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize the Prometheus metrics recorder.
///
/// This should be called once at application startup.
/// Returns the PrometheusHandle for rendering metrics.
pub fn init_metrics() -> &'static PrometheusHandle {
    METRICS_HANDLE.get_or_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("Failed to install Prometheus recorder");

        info!("Prometheus metrics recorder initialized");

        // Register metric descriptions
        register_metric_descriptions();

        handle
    })
}

/// Get the metrics handle (must call init_metrics first)
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Axum handler for /metrics endpoint
pub async fn metrics_handler() -> String {
    match get_metrics_handle() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

/// Register metric descriptions for documentation
fn register_metric_descriptions() {
    use metrics::describe_counter;
    use metrics::describe_gauge;
    use metrics::describe_histogram;

    // HTTP metrics
    describe_counter!("http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "http_requests_errors_total",
        "Total number of HTTP request errors"
    );

    // Agent turn metrics
    describe_counter!(
        "agent_turns_total",
        "Completed agent turns by outcome (ok, truncated, failed)"
    );
    describe_histogram!(
        "agent_turn_steps",
        "Model round trips consumed by a completed turn"
    );
    describe_gauge!("agent_active_sessions", "Sessions currently in memory");

    // Model call metrics
    describe_counter!(
        "model_requests_total",
        "Model streaming requests by outcome"
    );
    describe_histogram!(
        "model_request_duration_seconds",
        "Model streaming request duration in seconds"
    );
    describe_counter!(
        "model_tokens_total",
        "Tokens consumed by direction (input, output)"
    );

    // Tool backend metrics
    describe_counter!(
        "tool_calls_total",
        "Tool invocations by backend and status"
    );
    describe_histogram!(
        "tool_call_duration_seconds",
        "Tool invocation duration in seconds"
    );
    describe_gauge!(
        "backend_tools_available",
        "Tools currently listed in a backend's catalog"
    );

    // Credential metrics
    describe_counter!(
        "credential_refreshes_total",
        "Assume-role credential refreshes by outcome"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_handler_before_init() {
        // Depending on test ordering the recorder may already be installed;
        // either way the handler must not panic.
        let body = metrics_handler().await;
        assert!(body.starts_with('#') || body.contains("_total") || body.is_empty());
    }

    #[tokio::test]
    async fn test_init_metrics_is_idempotent() {
        let first = init_metrics();
        let second = init_metrics();
        assert!(std::ptr::eq(first, second));

        AgentMetrics::record_tool_call("billing", "ok", 5);
        let body = metrics_handler().await;
        assert!(body.contains("tool_calls_total"));
    }
}
