//! Readiness endpoint aggregating credential and backend state

use axum::{Router, response::IntoResponse, routing::get};
use axum_helpers::{HealthCheckFuture, run_health_checks};

use crate::state::AppState;

async fn ready(state: AppState) -> impl IntoResponse {
    let resolver = &state.resolver;
    let registry = &state.assistant.registry;

    let checks: Vec<(&str, HealthCheckFuture<'_>)> = vec![
        (
            "credentials",
            Box::pin(async move {
                resolver
                    .ensure_fresh()
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }),
        ),
        (
            "backends",
            Box::pin(async move {
                if registry.any_usable().await {
                    Ok(())
                } else {
                    Err("no usable tool backend".to_string())
                }
            }),
        ),
    ];

    match run_health_checks(checks).await {
        Ok(healthy) => healthy.into_response(),
        Err(unhealthy) => unhealthy.into_response(),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/ready", get(move || ready(state)))
}
