use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::{
    dao::storage::StorageError, dto::ws::ProtocolError, services::auth::AuthError,
    state::room::RoomError,
};

/// Errors that can occur in service layer operations.
///
/// None of them is fatal for a connection: the gateway reports them to the originator
/// as a single `error` event and keeps the socket open.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Caller is not allowed to perform the action (not host, not in room, not in group).
    #[error("{0}")]
    Permission(String),
    /// Action refused because the room is at a boundary (e.g. the first question).
    #[error("{0}")]
    Boundary(String),
    /// Inbound event could not be decoded into a command.
    #[error("malformed event: {0}")]
    Protocol(String),
    /// Token validation failed.
    #[error("{0}")]
    Unauthorized(#[from] AuthError),
    /// A persistence collaborator call failed.
    #[error("collaborator call failed: {0}")]
    Collaborator(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } => ServiceError::NotFound(err.to_string()),
            StorageError::Unavailable { .. } => ServiceError::Collaborator(err),
        }
    }
}

impl From<ProtocolError> for ServiceError {
    fn from(err: ProtocolError) -> Self {
        ServiceError::Protocol(err.to_string())
    }
}

impl From<RoomError> for ServiceError {
    fn from(err: RoomError) -> Self {
        match err {
            RoomError::FirstStep | RoomError::NotHosted => ServiceError::Boundary(err.to_string()),
            RoomError::NotHost
            | RoomError::NotInRoom
            | RoomError::AlreadyInRoom
            | RoomError::HostTaken { .. }
            | RoomError::GroupBusy { .. } => ServiceError::Permission(err.to_string()),
            RoomError::NotActive(_) => ServiceError::NotFound(err.to_string()),
        }
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Caller lacks the permission for the action.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Permission(message) => AppError::Forbidden(message),
            ServiceError::Boundary(message) => AppError::Conflict(message),
            ServiceError::Protocol(message) => AppError::BadRequest(message),
            ServiceError::Unauthorized(source) => AppError::Unauthorized(source.to_string()),
            ServiceError::Collaborator(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::NotFound(message) => AppError::NotFound(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
