//! Who may do what in a room.
//!
//! Predicates read the room state handed to them (the caller holds the room lock) and never
//! mutate it. Group membership is asked to the directory on every call.

use tracing::warn;

use crate::{
    dao::{live_store::GroupDirectory, storage::StorageError},
    error::ServiceError,
    services::auth::TokenClaims,
    state::{
        AppState, SessionContext,
        room::{Room, RoomError},
    },
};

/// Whether `username` is the active host of `room`.
pub fn is_host(room: &Room, username: &str) -> bool {
    room.participant(username)
        .is_some_and(|p| p.is_active() && p.is_host)
}

/// Only the host moves the presentation.
pub fn can_advance_step(room: &Room, username: &str) -> bool {
    is_host(room, username)
}

/// Only the host marks audience questions as answered.
pub fn can_toggle_answered_marker(room: &Room, username: &str) -> bool {
    is_host(room, username)
}

/// Only the host cancels the presentation.
pub fn can_cancel(room: &Room, username: &str) -> bool {
    is_host(room, username)
}

/// Refuse callers that are not active participants of `room`.
pub fn ensure_member(room: &Room, username: &str) -> Result<(), RoomError> {
    if room.is_active_member(username) {
        Ok(())
    } else {
        Err(RoomError::NotInRoom)
    }
}

/// Refuse a session whose connection no longer owns its participant record, e.g. a socket
/// left behind after the same username reconnected elsewhere.
pub fn ensure_session(room: &Room, context: &SessionContext) -> Result<(), RoomError> {
    match room.participant(&context.username) {
        Some(p) if p.is_active() && p.connection.id == context.connection.id => Ok(()),
        _ => Err(RoomError::NotInRoom),
    }
}

fn ensure(
    room: &Room,
    username: &str,
    allowed: fn(&Room, &str) -> bool,
) -> Result<(), RoomError> {
    ensure_member(room, username)?;
    if allowed(room, username) {
        Ok(())
    } else {
        Err(RoomError::NotHost)
    }
}

/// Member check, then [`can_advance_step`].
pub fn ensure_can_advance_step(room: &Room, username: &str) -> Result<(), RoomError> {
    ensure(room, username, can_advance_step)
}

/// Member check, then [`can_toggle_answered_marker`].
pub fn ensure_can_toggle_answered_marker(room: &Room, username: &str) -> Result<(), RoomError> {
    ensure(room, username, can_toggle_answered_marker)
}

/// Member check, then [`can_cancel`].
pub fn ensure_can_cancel(room: &Room, username: &str) -> Result<(), RoomError> {
    ensure(room, username, can_cancel)
}

/// Whether `user_id` may enter a room scoped to `group_id`.
pub async fn can_join_group_scoped_room(
    groups: &dyn GroupDirectory,
    group_id: &str,
    user_id: &str,
) -> Result<bool, StorageError> {
    groups
        .is_user_in_group(group_id.to_string(), user_id.to_string())
        .await
}

/// Validate `token` and check its bearer belongs to `group_id`.
///
/// Runs before any room lock is taken.
pub async fn authorize_group_member(
    state: &AppState,
    group_id: &str,
    token: Option<&str>,
) -> Result<TokenClaims, ServiceError> {
    let claims = state.tokens().validate(token.unwrap_or_default())?;
    let groups = state.require_groups().await?;
    if can_join_group_scoped_room(groups.as_ref(), group_id, &claims.user_id).await? {
        Ok(claims)
    } else {
        warn!(group_id, user_id = %claims.user_id, "group membership denied");
        Err(ServiceError::Permission(format!(
            "You are not a member of group {group_id}"
        )))
    }
}
