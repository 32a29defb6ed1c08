use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report liveness, pinging the persistence collaborator and logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    let active_rooms = state.registry().list_active_room_ids().await.len();
    if state.is_degraded() {
        HealthResponse::degraded(active_rooms)
    } else {
        HealthResponse::ok(active_rooms)
    }
}
