use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for BuzzControl Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::ws::BuzzerInfo,
            crate::dto::ws::ClientTimestamps,
            crate::dto::ws::ServerConfigInfo,
            crate::dto::ws::PeerRole,
            crate::dao::models::QuestionKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "realtime", description = "WebSocket channel for the console and buzzer devices"),
    )
)]
pub struct ApiDoc;
