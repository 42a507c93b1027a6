//! OpenAPI documentation configuration

use utoipa::OpenApi;

/// Combined OpenAPI documentation for the FinOps assistant API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "FinOps Assistant API",
        version = "0.1.0",
        description = "Conversational FinOps assistant with streaming agent turns and JSON-RPC tool backends",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    nest(
        (path = "/api/assistant", api = domain_assistant::ApiDoc)
    ),
    components(schemas(axum_helpers::ErrorResponse)),
    tags(
        (name = "assistant-chat", description = "Streaming conversation endpoints")
    )
)]
pub struct ApiDoc;
