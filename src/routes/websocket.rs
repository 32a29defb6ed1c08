use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};

use crate::{
    services::{notification_service, websocket_service},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/ws",
    tag = "live",
    responses((status = 101, description = "Switching protocols to the room WebSocket"))
)]
/// Upgrade the HTTP connection into a live room session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_service::handle_socket(state, socket))
}

#[utoipa::path(
    get,
    path = "/ws/notifications",
    tag = "live",
    responses((status = 101, description = "Switching protocols to the group notification WebSocket"))
)]
/// Upgrade the HTTP connection into a group notification feed.
pub async fn notifications_handler(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| notification_service::handle_socket(state, socket))
}

/// Configure the WebSocket endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/ws", get(ws_handler))
        .route("/ws/notifications", get(notifications_handler))
}
