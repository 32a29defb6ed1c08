use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::{
        room::{ActiveRoomsResponse, PresentationNotification, RoomSnapshot},
        validation::validate_identifier,
    },
    error::AppError,
    services::room_service,
    state::SharedState,
};

/// Read-only endpoints exposing live rooms and group presentations.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms", get(list_rooms))
        .route("/rooms/{room_id}", get(get_room))
        .route("/groups/{group_id}/presentation", get(get_group_presentation))
}

fn check_identifier(id: &str) -> Result<(), AppError> {
    validate_identifier(id).map_err(|err| {
        AppError::BadRequest(
            err.message
                .map(|message| message.to_string())
                .unwrap_or_else(|| err.code.to_string()),
        )
    })
}

#[utoipa::path(
    get,
    path = "/rooms",
    tag = "rooms",
    responses((status = 200, description = "Rooms with active participants", body = ActiveRoomsResponse))
)]
/// List rooms that currently have at least one active participant.
pub async fn list_rooms(State(state): State<SharedState>) -> Json<ActiveRoomsResponse> {
    Json(room_service::list_rooms(&state).await)
}

#[utoipa::path(
    get,
    path = "/rooms/{room_id}",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Room snapshot", body = RoomSnapshot),
        (status = 400, description = "Invalid room identifier"),
        (status = 404, description = "Room is not active")
    )
)]
/// Return the step, group binding and active participants of a room.
pub async fn get_room(
    State(state): State<SharedState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomSnapshot>, AppError> {
    check_identifier(&room_id)?;
    let payload = room_service::room_snapshot(&state, &room_id).await?;
    Ok(Json(payload))
}

#[utoipa::path(
    get,
    path = "/groups/{group_id}/presentation",
    tag = "rooms",
    params(("group_id" = String, Path, description = "Group identifier")),
    responses(
        (status = 200, description = "Room presented to the group", body = PresentationNotification),
        (status = 404, description = "No presentation running for the group")
    )
)]
/// Return the room currently presented to a group.
pub async fn get_group_presentation(
    State(state): State<SharedState>,
    Path(group_id): Path<String>,
) -> Result<Json<PresentationNotification>, AppError> {
    check_identifier(&group_id)?;
    let payload = room_service::group_presentation(&state, &group_id).await?;
    Ok(Json(payload))
}
