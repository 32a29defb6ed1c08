use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the live-session backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::list_rooms,
        crate::routes::rooms::get_room,
        crate::routes::rooms::get_group_presentation,
        crate::routes::websocket::ws_handler,
        crate::routes::websocket::notifications_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::room::ActiveRoomsResponse,
            crate::dto::room::RoomSnapshot,
            crate::dto::room::ParticipantSummary,
            crate::dto::room::PresentationNotification,
            crate::dto::live::AnswerCount,
            crate::dto::live::AnswerRecord,
            crate::dto::live::ChatMessage,
            crate::dto::live::AudienceQuestion,
            crate::dto::ws::EventFrame,
            crate::state::presence::PresenceStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Live rooms and group presentations"),
        (name = "live", description = "WebSocket channels for rooms and group notifications"),
    )
)]
pub struct ApiDoc;
