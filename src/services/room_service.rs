use tracing::{info, warn};

use crate::{
    dto::{
        room::{ActiveRoomsResponse, ParticipantSummary, PresentationNotification, RoomSnapshot},
        ws::{EventFrame, HostRequest, JoinRequest, StepDirection},
    },
    error::ServiceError,
    services::{
        broadcast::{self, events},
        permission,
    },
    state::{
        AppState, ConnectionHandle, SessionContext,
        registry::{CancelOutcome, Departure},
        room::{Room, RoomError},
    },
};

/// Run `check` against the live room of `context`.
pub(crate) async fn authorize(
    state: &AppState,
    context: &SessionContext,
    check: fn(&Room, &str) -> Result<(), RoomError>,
) -> Result<(), ServiceError> {
    state
        .registry()
        .with_room(&context.room_id, |room| {
            permission::ensure_session(room, context)?;
            check(room, &context.username)
        })
        .await
        .ok_or_else(|| RoomError::NotActive(context.room_id.clone()))??;
    Ok(())
}

/// Broadcast `frames`, in order, to the room under a single lock acquisition.
pub(crate) async fn broadcast_frames(state: &AppState, room_id: &str, frames: &[EventFrame]) {
    let delivered = state
        .registry()
        .with_room(room_id, |room| {
            for frame in frames {
                broadcast::broadcast_to_room(room, frame);
            }
        })
        .await;
    if delivered.is_none() {
        warn!(room_id, "room vanished before broadcast");
    }
}

/// Reply to the originating connection only.
pub(crate) fn reply<T>(connection: &ConnectionHandle, event: &str, payload: &T)
where
    T: ?Sized + serde::Serialize,
{
    if broadcast::send_to_connection(connection, event, payload).is_err() {
        warn!(connection_id = %connection.id, event, "reply dropped, connection closed");
    }
}

/// Claim the host role of a room, optionally scoped to a group.
///
/// Group membership is verified before the room is touched; a refused check leaves
/// the registry unchanged.
pub async fn host(
    state: &AppState,
    connection: &ConnectionHandle,
    request: HostRequest,
) -> Result<SessionContext, ServiceError> {
    if let Some(group_id) = request.group_id.as_deref() {
        permission::authorize_group_member(state, group_id, request.token.as_deref()).await?;
    }

    let context = state
        .registry()
        .host_room(
            &request.room_id,
            &request.username,
            connection.clone(),
            request.group_id.as_deref(),
        )
        .await?;

    let step = state.registry().get_step(&context.room_id).await;
    if let Some(frame) = broadcast::frame(events::ROOM_STATE, &step) {
        broadcast_frames(state, &context.room_id, &[frame]).await;
    }

    if let Some(group_id) = request.group_id {
        let notification = PresentationNotification {
            room_id: context.room_id.clone(),
            group_id,
        };
        if let Some(frame) = broadcast::frame(events::NOTIFY, &notification) {
            let reached = broadcast::broadcast_to_group_channel(
                state.notifications(),
                &notification.group_id,
                &frame,
            );
            info!(
                room_id = %notification.room_id,
                group_id = %notification.group_id,
                reached,
                "group notified of presentation"
            );
        }
    }

    Ok(context)
}

/// Join a room as a participant.
///
/// Group-scoped rooms require a token whose bearer is a joined member of the group; the
/// check runs on every attempt.
pub async fn join(
    state: &AppState,
    connection: &ConnectionHandle,
    request: JoinRequest,
) -> Result<SessionContext, ServiceError> {
    let scope = state.registry().group_of(&request.room_id).await;
    if let Some(group_id) = scope.as_deref() {
        permission::authorize_group_member(state, group_id, request.token.as_deref()).await?;
    }

    let context = state
        .registry()
        .join_room(&request.room_id, &request.username, connection.clone())
        .await?;

    // The room may have been bound to another group while membership was being checked.
    let current = state.registry().group_of(&context.room_id).await;
    if current.is_some() && current != scope {
        state.registry().leave_room(connection.id).await;
        return Err(ServiceError::Permission(
            "Room access changed, please join again".into(),
        ));
    }

    let step = state.registry().get_step(&context.room_id).await;
    reply(&context.connection, events::ROOM_STATE, &step);
    Ok(context)
}

/// Move the room one step forward or back and broadcast the new step.
pub async fn step(
    state: &AppState,
    context: &SessionContext,
    direction: StepDirection,
) -> Result<u32, ServiceError> {
    let step = state
        .registry()
        .with_room(&context.room_id, |room| {
            permission::ensure_session(room, context)?;
            permission::ensure_can_advance_step(room, &context.username)?;
            let step = room.advance_step(direction)?;
            if let Some(frame) = broadcast::frame(events::ROOM_STATE, &step) {
                broadcast::broadcast_to_room(room, &frame);
            }
            Ok::<_, RoomError>(step)
        })
        .await
        .ok_or_else(|| RoomError::NotActive(context.room_id.clone()))??;

    info!(room_id = %context.room_id, username = %context.username, step, "step changed");
    Ok(step)
}

/// Reply with the current step; `0` when the room is gone.
pub async fn room_state(state: &AppState, context: &SessionContext) {
    let step = state.registry().get_step(&context.room_id).await;
    reply(&context.connection, events::ROOM_STATE, &step);
}

/// Reply with the identifiers of rooms that still have someone in them.
pub async fn active_rooms(state: &AppState, connection: &ConnectionHandle) {
    let room_ids = state.registry().list_active_room_ids().await;
    reply(connection, events::ROOM_ACTIVE, &room_ids);
}

/// Reply with the active participants of the caller's room.
pub async fn active_participants(state: &AppState, context: &SessionContext) {
    let participants: Vec<ParticipantSummary> = state
        .registry()
        .list_active_participants(&context.room_id)
        .await
        .iter()
        .map(ParticipantSummary::from)
        .collect();
    reply(&context.connection, events::ACTIVE_PARTICIPANTS, &participants);
}

/// Tear a room down on behalf of its host, telling members and the group first.
pub async fn cancel(
    state: &AppState,
    context: &SessionContext,
    room_id: &str,
) -> Result<(), ServiceError> {
    let frame = broadcast::frame(events::CANCEL_PRESENTATION, room_id);
    let outcome = state
        .registry()
        .cancel_room(room_id, context, |room| {
            if let Some(frame) = frame.as_ref() {
                broadcast::broadcast_to_room(room, frame);
            }
        })
        .await?;

    match outcome {
        CancelOutcome::NotActive => {
            reply(&context.connection, events::NOTIFY, "Room is not active, skip cancel");
        }
        CancelOutcome::Cancelled { group_id } => {
            if let (Some(group_id), Some(frame)) = (group_id, frame.as_ref()) {
                broadcast::broadcast_to_group_channel(state.notifications(), &group_id, frame);
            }
        }
    }
    Ok(())
}

/// Tell a late-joining group member which room is presented to the group.
pub async fn slide_presentation(
    state: &AppState,
    connection: &ConnectionHandle,
    group_id: &str,
) -> Result<(), ServiceError> {
    let presentation = group_presentation(state, group_id).await?;
    reply(connection, events::SLIDE_PRESENTATION, &presentation.room_id);
    Ok(())
}

/// Release whatever the connection holds; called on every disconnect.
pub async fn leave(state: &AppState, connection: &ConnectionHandle) -> Option<Departure> {
    let departure = state.registry().leave_room(connection.id).await?;
    info!(
        room_id = %departure.room_id,
        username = %departure.username,
        torn_down = departure.torn_down,
        "participant disconnected"
    );
    Some(departure)
}

/// Rooms with at least one active participant.
pub async fn list_rooms(state: &AppState) -> ActiveRoomsResponse {
    ActiveRoomsResponse {
        room_ids: state.registry().list_active_room_ids().await,
    }
}

/// Snapshot of a live room for the query endpoints.
pub async fn room_snapshot(state: &AppState, room_id: &str) -> Result<RoomSnapshot, ServiceError> {
    state
        .registry()
        .view(room_id)
        .await
        .map(RoomSnapshot::from)
        .ok_or_else(|| RoomError::NotActive(room_id.to_string()).into())
}

/// Room currently presented to `group_id`.
pub async fn group_presentation(
    state: &AppState,
    group_id: &str,
) -> Result<PresentationNotification, ServiceError> {
    let room_id = state
        .registry()
        .room_for_group(group_id)
        .await
        .ok_or_else(|| {
            ServiceError::NotFound(format!("No presentation is running for group {group_id}"))
        })?;
    Ok(PresentationNotification {
        room_id,
        group_id: group_id.to_string(),
    })
}
