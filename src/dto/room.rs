use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::{presence::PresenceStatus, registry::RoomView, room::Participant};

/// Participant as exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    /// Display name.
    pub username: String,
    /// Whether this participant is the host.
    pub is_host: bool,
    /// `active` or `left`.
    pub status: PresenceStatus,
}

impl From<&Participant> for ParticipantSummary {
    fn from(participant: &Participant) -> Self {
        Self {
            username: participant.username.clone(),
            is_host: participant.is_host,
            status: participant.status,
        }
    }
}

/// Rooms with at least one active participant.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRoomsResponse {
    /// Identifiers in creation order.
    pub room_ids: Vec<String>,
}

/// Current state of one live room.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    /// Room identifier.
    pub room_id: String,
    /// Current step; `0` until the room is hosted.
    pub step: u32,
    /// Group the room is restricted to, if any.
    pub group_id: Option<String>,
    /// Active participants in arrival order.
    pub participants: Vec<ParticipantSummary>,
}

impl From<RoomView> for RoomSnapshot {
    fn from(view: RoomView) -> Self {
        Self {
            room_id: view.room_id,
            step: view.step,
            group_id: view.group_id,
            participants: view
                .participants
                .iter()
                .map(ParticipantSummary::from)
                .collect(),
        }
    }
}

/// Room currently presented to a group; pushed on the group notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PresentationNotification {
    /// Room being presented.
    pub room_id: String,
    /// Group the room is bound to.
    pub group_id: String,
}
