use axum::{Json, Router, extract::State, http::StatusCode, routing::get};

use crate::{dto::health::HealthResponse, services::health_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/healthcheck",
    tag = "health",
    responses(
        (status = 200, description = "Storage reachable", body = HealthResponse),
        (status = 503, description = "Running without storage; live rooms still work", body = HealthResponse)
    )
)]
/// Report storage health and the number of live rooms.
pub async fn healthcheck(State(state): State<SharedState>) -> (StatusCode, Json<HealthResponse>) {
    let report = health_service::health_status(&state).await;
    let code = if report.status == HealthResponse::DEGRADED {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(report))
}

/// Health routes.
pub fn router() -> Router<SharedState> {
    Router::new().route("/healthcheck", get(healthcheck))
}
