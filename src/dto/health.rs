use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Rooms with at least one active participant.
    pub active_rooms: usize,
}

impl HealthResponse {
    /// Status reported while storage is reachable.
    pub const OK: &str = "ok";
    /// Status reported while running without storage.
    pub const DEGRADED: &str = "degraded";

    /// Create a health response indicating the system is operational.
    pub fn ok(active_rooms: usize) -> Self {
        Self {
            status: Self::OK.to_string(),
            active_rooms,
        }
    }

    /// Create a health response indicating the system is in degraded mode.
    pub fn degraded(active_rooms: usize) -> Self {
        Self {
            status: Self::DEGRADED.to_string(),
            active_rooms,
        }
    }
}
