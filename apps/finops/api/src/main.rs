//! FinOps assistant API - streaming agent server

use axum_helpers::server::{create_production_app, health_router};
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_assistant::agent::AnthropicClient;
use domain_assistant::backends::{BackendConfig, HttpBackendTransport};
use domain_assistant::credentials::StsRoleAssumer;
use domain_assistant::models::CapabilityTag;
use domain_assistant::{
    AgentOrchestrator, AssistantState, CredentialResolver, SessionStore, ToolBackendRegistry,
};
use observability::{init_metrics, metrics_handler, metrics_middleware};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod api;
mod config;
mod openapi;
mod state;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    init_tracing(&config.environment);
    init_metrics();

    // Resolve credentials up front so misconfiguration surfaces in the
    // logs at startup. A failure is not fatal: the service still serves
    // conversation, tools stay down until credentials recover.
    let assumer = StsRoleAssumer::from_env(&config.agent.aws_region).await;
    let resolver = Arc::new(CredentialResolver::new(
        Arc::new(assumer),
        config.agent.target_role_arn.clone(),
        config.agent.role_session_duration_secs,
    ));
    let startup_handle = match resolver.resolve().await {
        Ok(handle) => {
            info!(scope = %handle.scope, "Credentials resolved");
            Some(handle)
        }
        Err(e) => {
            warn!(error = %e, "Credential resolution failed at startup");
            None
        }
    };

    // Tool backends
    let transport_timeout = Duration::from_secs(config.agent.tool_call_timeout_secs);
    let registry = Arc::new(ToolBackendRegistry::new(transport_timeout));

    registry
        .register(
            BackendConfig {
                backend_id: "billing".to_string(),
                capability: CapabilityTag::Billing,
                endpoint: config.agent.billing_mcp_url.clone(),
            },
            Arc::new(HttpBackendTransport::new(
                &config.agent.billing_mcp_url,
                transport_timeout,
            )?),
        )
        .await;

    if config.agent.enable_aws_api_server {
        registry
            .register(
                BackendConfig {
                    backend_id: "aws-api".to_string(),
                    capability: CapabilityTag::Investigation,
                    endpoint: config.agent.aws_api_mcp_url.clone(),
                },
                Arc::new(HttpBackendTransport::new(
                    &config.agent.aws_api_mcp_url,
                    transport_timeout,
                )?),
            )
            .await;
    }

    let startup_credentials = startup_handle
        .as_ref()
        .and_then(|handle| handle.credentials.clone());
    registry.start_all(startup_credentials.as_ref()).await;

    // Agent core
    let model = AnthropicClient::new(&config.agent)?;
    let sessions = Arc::new(SessionStore::new(&config.agent.model_id));
    let orchestrator = AgentOrchestrator::new(
        Arc::new(model),
        Arc::clone(&registry),
        Arc::clone(&resolver),
        Arc::clone(&sessions),
        config.agent.max_steps,
    );

    let state = AppState {
        config: config.clone(),
        assistant: AssistantState {
            orchestrator,
            sessions,
            registry,
        },
        resolver,
    };

    // Build router with docs, health, and metrics
    let api_routes = api::routes(&state);
    let router = axum_helpers::create_router::<openapi::ApiDoc>(api_routes).await?;
    let app = router
        .merge(health_router(state.config.app.clone()))
        .merge(api::health::router(state.clone()))
        .route("/metrics", axum::routing::get(metrics_handler))
        .layer(axum::middleware::from_fn(metrics_middleware));

    info!(
        port = state.config.server.port,
        model = %state.config.agent.model_id,
        "Starting FinOps assistant API"
    );

    create_production_app(
        app,
        &state.config.server,
        Duration::from_secs(30),
        async move {
            info!("Shutting down: dropping in-memory sessions");
        },
    )
    .await
    .map_err(|e| eyre::eyre!("Server error: {e}"))?;

    info!("FinOps assistant API shutdown complete");
    Ok(())
}
