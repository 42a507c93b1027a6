//! HTTP handlers for the assistant domain with SSE streaming

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
    Router,
};
use axum_helpers::{
    UuidPath, ValidatedJson,
    errors::responses::{
        BadRequestUuidResponse, BadRequestValidationResponse, ConflictResponse,
        InternalServerErrorResponse, NotFoundResponse,
    },
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use utoipa::OpenApi;

use crate::agent::AgentOrchestrator;
use crate::backends::ToolBackendRegistry;
use crate::error::{AssistantError, AssistantResult};
use crate::models::{
    AgentEvent, BackendView, SendMessageRequest, SessionView, ToolCallRequest, ToolCallResult,
    ToolSummary, Turn, UsageCounters,
};
use crate::session::SessionStore;

/// Shared state for handlers
#[derive(Clone)]
pub struct AssistantState {
    pub orchestrator: AgentOrchestrator,
    pub sessions: Arc<SessionStore>,
    pub registry: Arc<ToolBackendRegistry>,
}

/// OpenAPI documentation for the assistant API
#[derive(OpenApi)]
#[openapi(
    paths(
        send_message,
        cancel_turn,
        get_session,
        reset_session,
        get_usage,
        list_backends,
    ),
    components(
        schemas(
            SendMessageRequest,
            SessionView,
            Turn,
            ToolCallRequest,
            ToolCallResult,
            UsageCounters,
            AgentEvent,
            BackendView,
            ToolSummary,
        ),
        responses(
            NotFoundResponse,
            BadRequestValidationResponse,
            BadRequestUuidResponse,
            ConflictResponse,
            InternalServerErrorResponse
        )
    ),
    tags(
        (name = "assistant-chat", description = "Streaming conversation endpoints"),
        (name = "assistant-sessions", description = "Session lifecycle and usage"),
        (name = "assistant-backends", description = "Tool backend health and catalog")
    )
)]
pub struct ApiDoc;

/// Create the assistant router with all HTTP endpoints
pub fn router(state: AssistantState) -> Router {
    Router::new()
        .route("/sessions/{id}/messages", post(send_message))
        .route("/sessions/{id}/cancel", post(cancel_turn))
        .route("/sessions/{id}", get(get_session).delete(reset_session))
        .route("/sessions/{id}/usage", get(get_usage))
        .route("/backends", get(list_backends))
        .with_state(state)
}

// =============================================================================
// Chat Endpoints
// =============================================================================

/// Send a message and stream the turn's events via SSE
#[utoipa::path(
    post,
    path = "/sessions/{id}/messages",
    tag = "assistant-chat",
    params(("id" = uuid::Uuid, Path, description = "Session ID")),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "SSE stream of agent events", body = AgentEvent),
        (status = 400, response = BadRequestValidationResponse),
        (status = 409, response = ConflictResponse)
    )
)]
async fn send_message(
    State(state): State<AssistantState>,
    UuidPath(session_id): UuidPath,
    ValidatedJson(request): ValidatedJson<SendMessageRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        let mut events = match state.orchestrator.send_message(session_id, request.message).await {
            Ok(events) => events,
            Err(e) => {
                // Turn never started; report it in-band on the stream
                let failed = AgentEvent::TurnFailed {
                    reason: "rejected".to_string(),
                    detail: Some(e.to_string()),
                };
                yield Ok(to_sse_event(&failed));
                return;
            }
        };

        use futures::StreamExt;
        while let Some(event) = events.next().await {
            yield Ok(to_sse_event(&event));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse_event(event: &AgentEvent) -> Event {
    let data = serde_json::to_string(event)
        .unwrap_or_else(|_| "{\"type\":\"turn_failed\",\"reason\":\"internal\"}".to_string());
    Event::default().event(event.event_name()).data(data)
}

/// Request cancellation of the session's in-flight turn
#[utoipa::path(
    post,
    path = "/sessions/{id}/cancel",
    tag = "assistant-chat",
    params(("id" = uuid::Uuid, Path, description = "Session ID")),
    responses(
        (status = 202, description = "Cancellation requested"),
        (status = 400, response = BadRequestUuidResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn cancel_turn(
    State(state): State<AssistantState>,
    UuidPath(session_id): UuidPath,
) -> AssistantResult<StatusCode> {
    state.orchestrator.cancel(session_id).await?;
    Ok(StatusCode::ACCEPTED)
}

// =============================================================================
// Session Endpoints
// =============================================================================

/// Get a session's history and usage
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "assistant-sessions",
    params(("id" = uuid::Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session detail", body = SessionView),
        (status = 400, response = BadRequestUuidResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn get_session(
    State(state): State<AssistantState>,
    UuidPath(session_id): UuidPath,
) -> AssistantResult<Json<SessionView>> {
    let session = state
        .sessions
        .get(session_id)
        .await
        .ok_or_else(|| AssistantError::SessionNotFound(session_id.to_string()))?;
    Ok(Json(session.view().await))
}

/// Reset a session: history and counters are gone, the id is reusable
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    tag = "assistant-sessions",
    params(("id" = uuid::Uuid, Path, description = "Session ID")),
    responses(
        (status = 204, description = "Session reset"),
        (status = 400, response = BadRequestUuidResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn reset_session(
    State(state): State<AssistantState>,
    UuidPath(session_id): UuidPath,
) -> AssistantResult<StatusCode> {
    state
        .sessions
        .remove(session_id)
        .await
        .ok_or_else(|| AssistantError::SessionNotFound(session_id.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Get a session's usage counters
#[utoipa::path(
    get,
    path = "/sessions/{id}/usage",
    tag = "assistant-sessions",
    params(("id" = uuid::Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Usage counters", body = UsageCounters),
        (status = 400, response = BadRequestUuidResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn get_usage(
    State(state): State<AssistantState>,
    UuidPath(session_id): UuidPath,
) -> AssistantResult<Json<UsageCounters>> {
    let session = state
        .sessions
        .get(session_id)
        .await
        .ok_or_else(|| AssistantError::SessionNotFound(session_id.to_string()))?;
    Ok(Json(session.usage.snapshot()))
}

// =============================================================================
// Backend Endpoints
// =============================================================================

/// List tool backends with their health and catalogs
#[utoipa::path(
    get,
    path = "/backends",
    tag = "assistant-backends",
    responses(
        (status = 200, description = "Backend views", body = Vec<BackendView>)
    )
)]
async fn list_backends(State(state): State<AssistantState>) -> impl IntoResponse {
    Json(state.registry.views().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::model::{MockModelClient, ModelEvent, ModelEventStream};
    use crate::credentials::{CredentialResolver, MockRoleAssumer};
    use axum::body::Body;
    use axum::http::{Request, header};
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn stream_of(events: Vec<AssistantResult<ModelEvent>>) -> ModelEventStream {
        Box::pin(futures::stream::iter(events))
    }

    fn test_state(model: MockModelClient) -> AssistantState {
        let registry = Arc::new(ToolBackendRegistry::new(Duration::from_secs(5)));
        let sessions = Arc::new(SessionStore::new("test-model"));
        let resolver = Arc::new(CredentialResolver::new(
            Arc::new(MockRoleAssumer::new()),
            None,
            3600,
        ));
        let orchestrator = AgentOrchestrator::new(
            Arc::new(model),
            Arc::clone(&registry),
            resolver,
            Arc::clone(&sessions),
            10,
        );
        AssistantState {
            orchestrator,
            sessions,
            registry,
        }
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_send_message_streams_events() {
        let mut model = MockModelClient::new();
        model.expect_stream_turn().returning(|_, _, _| {
            Ok(stream_of(vec![
                Ok(ModelEvent::TextDelta("hi".to_string())),
                Ok(ModelEvent::Usage {
                    input_tokens: 10,
                    output_tokens: 2,
                }),
                Ok(ModelEvent::Stop),
            ]))
        });

        let app = router(test_state(model));
        let session_id = Uuid::new_v4();
        let response = app
            .oneshot(json_request(
                "POST",
                &format!("/sessions/{session_id}/messages"),
                serde_json::json!({"message": "hello"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("event: text_delta"));
        assert!(text.contains("event: turn_complete"));
    }

    #[tokio::test]
    async fn test_send_message_rejects_empty_message() {
        let app = router(test_state(MockModelClient::new()));
        let session_id = Uuid::new_v4();
        let response = app
            .oneshot(json_request(
                "POST",
                &format!("/sessions/{session_id}/messages"),
                serde_json::json!({"message": ""}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_busy_session_reports_rejection_in_band() {
        let state = test_state(MockModelClient::new());
        let session_id = Uuid::new_v4();
        let session = state.sessions.get_or_create(session_id).await;
        assert!(session.begin_turn());

        let app = router(state);
        let response = app
            .oneshot(json_request(
                "POST",
                &format!("/sessions/{session_id}/messages"),
                serde_json::json!({"message": "hello"}),
            ))
            .await
            .unwrap();

        // The stream opens fine; the rejection arrives as an event
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("event: turn_failed"));
        assert!(text.contains("already in progress"));
    }

    #[tokio::test]
    async fn test_get_unknown_session_is_404() {
        let app = router(test_state(MockModelClient::new()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reset_session() {
        let state = test_state(MockModelClient::new());
        let session_id = Uuid::new_v4();
        state.sessions.get_or_create(session_id).await;

        let app = router(state.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/sessions/{session_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.sessions.get(session_id).await.is_none());
    }

    #[tokio::test]
    async fn test_usage_endpoint_returns_counters() {
        let state = test_state(MockModelClient::new());
        let session_id = Uuid::new_v4();
        let session = state.sessions.get_or_create(session_id).await;
        session.usage.record(1000, 500, 2);

        let app = router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{session_id}/usage"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let usage: UsageCounters = serde_json::from_slice(&body).unwrap();
        assert_eq!(usage.prompt_tokens, 1000);
        assert!(usage.estimated_cost > 0.0);
    }

    #[tokio::test]
    async fn test_list_backends_empty_registry() {
        let app = router(test_state(MockModelClient::new()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/backends")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let views: Vec<BackendView> = serde_json::from_slice(&body).unwrap();
        assert!(views.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_unknown_session_is_404() {
        let app = router(test_state(MockModelClient::new()));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/sessions/{}/cancel", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
