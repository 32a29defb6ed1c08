use axum::Router;

use crate::state::SharedState;

/// OpenAPI document and Swagger UI.
pub mod docs;
/// Liveness and readiness.
pub mod health;
/// Read-only room queries.
pub mod rooms;
/// Room and notification socket upgrades.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(websocket::router())
        .merge(rooms::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
