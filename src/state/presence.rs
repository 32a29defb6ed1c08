//! Who is currently connected to a room.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{
    ConnectionHandle,
    room::{Participant, Room},
};

/// Presence of a participant. Departed participants are kept so a reconnect restores their role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// Holds a live connection.
    Active,
    /// Disconnected or cancelled; kept for reconnects.
    Left,
}

impl Room {
    /// Mark `username` active on `connection`, inserting it when unknown.
    ///
    /// A connection speaks for one participant at a time: any other username still active
    /// on the same connection is marked departed. `is_host` overrides the stored role;
    /// `None` keeps it (new participants start as guests).
    pub(super) fn activate(
        &mut self,
        username: &str,
        connection: ConnectionHandle,
        is_host: Option<bool>,
    ) -> &Participant {
        for other in self.participants.values_mut() {
            if other.username != username
                && other.is_active()
                && other.connection.id == connection.id
            {
                other.status = PresenceStatus::Left;
            }
        }

        let participant = self
            .participants
            .entry(username.to_string())
            .and_modify(|p| {
                p.status = PresenceStatus::Active;
                p.connection = connection.clone();
            })
            .or_insert_with(|| Participant {
                username: username.to_string(),
                is_host: false,
                status: PresenceStatus::Active,
                connection,
            });
        if let Some(is_host) = is_host {
            participant.is_host = is_host;
        }
        participant
    }

    /// Mark every participant bound to `connection_id` as departed and return the first one.
    ///
    /// Returns `None` when the connection no longer owns an active record, e.g. when the
    /// username already reconnected through a newer socket.
    pub fn release(&mut self, connection_id: Uuid) -> Option<&Participant> {
        let mut first = None;
        for (index, participant) in self.participants.values_mut().enumerate() {
            if participant.is_active() && participant.connection.id == connection_id {
                participant.status = PresenceStatus::Left;
                first.get_or_insert(index);
            }
        }
        self.participants
            .get_index(first?)
            .map(|(_, participant)| participant)
    }

    /// Active participants in arrival order.
    pub fn active_participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values().filter(|p| p.is_active())
    }

    /// Whether anyone is still connected.
    pub fn has_active(&self) -> bool {
        self.active_participants().next().is_some()
    }

    /// Whether `username` is present right now.
    pub fn is_active_member(&self, username: &str) -> bool {
        self.participant(username).is_some_and(Participant::is_active)
    }
}
