use indexmap::IndexMap;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    dto::ws::StepDirection,
    state::{ConnectionHandle, presence::PresenceStatus},
};

/// Rule violations detected while mutating a room.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    /// Action reserved to the active host.
    #[error("You are not the host of this room")]
    NotHost,
    /// Caller has no active record in the room.
    #[error("You are not in this room")]
    NotInRoom,
    /// Username already active on another connection.
    #[error("You are already in this room")]
    AlreadyInRoom,
    /// Another username is the active host.
    #[error("Room is already hosted by {holder}")]
    HostTaken {
        /// Username holding the host role.
        holder: String,
    },
    /// The group is presenting a different room.
    #[error("Group {group_id} is already presenting room {room_id}")]
    GroupBusy {
        /// Group the host asked for.
        group_id: String,
        /// Room the group currently presents.
        room_id: String,
    },
    /// `prev` at step 1.
    #[error("You are at the first question")]
    FirstStep,
    /// Step change before anyone hosted the room.
    #[error("Presentation has not started yet")]
    NotHosted,
    /// No live room under this identifier.
    #[error("Room {0} is not active")]
    NotActive(String),
}

#[derive(Debug, Clone)]
/// Someone known to a room, present or departed.
pub struct Participant {
    /// Key of the record inside its room.
    pub username: String,
    /// Holds the host role.
    pub is_host: bool,
    /// Present or departed.
    pub status: PresenceStatus,
    /// Latest socket of this participant.
    pub connection: ConnectionHandle,
}

impl Participant {
    /// Whether the participant is connected.
    pub fn is_active(&self) -> bool {
        self.status == PresenceStatus::Active
    }
}

/// One live presentation: its participants in arrival order and its current step.
///
/// Step `0` means nobody hosted the room yet; hosting moves it to `1`.
#[derive(Debug)]
pub struct Room {
    id: String,
    pub(super) participants: IndexMap<String, Participant>,
    step: u32,
    torn_down: bool,
}

impl Room {
    /// Empty, not yet hosted room.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            participants: IndexMap::new(),
            step: 0,
            torn_down: false,
        }
    }

    /// Room identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current step.
    pub fn step(&self) -> u32 {
        self.step
    }

    /// Record of `username`, present or departed.
    pub fn participant(&self, username: &str) -> Option<&Participant> {
        self.participants.get(username)
    }

    /// Whether the room was removed from the registry; a torn down room must not be reused.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub(super) fn mark_torn_down(&mut self) {
        self.torn_down = true;
    }

    pub(super) fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Every connection that ever belonged to the room.
    pub(super) fn connection_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.participants.values().map(|p| p.connection.id)
    }

    /// Make `username` the host, bound to `connection`.
    ///
    /// Fails while a different active participant holds the host role. A host that left
    /// is demoted so at most one participant is ever flagged as host.
    pub fn claim_host(
        &mut self,
        username: &str,
        connection: ConnectionHandle,
    ) -> Result<(), RoomError> {
        if let Some(holder) = self
            .participants
            .values()
            .find(|p| p.is_host && p.is_active() && p.username != username)
        {
            return Err(RoomError::HostTaken {
                holder: holder.username.clone(),
            });
        }

        for participant in self.participants.values_mut() {
            if participant.username != username {
                participant.is_host = false;
            }
        }

        self.activate(username, connection, Some(true));
        if self.step == 0 {
            self.step = 1;
        }
        Ok(())
    }

    /// Admit `username` as a participant and return its host flag.
    ///
    /// A departed participant is reactivated with its previous role; the same connection
    /// joining twice is a no-op.
    pub fn admit(&mut self, username: &str, connection: ConnectionHandle) -> Result<bool, RoomError> {
        if let Some(existing) = self.participants.get(username)
            && existing.is_active()
            && existing.connection.id != connection.id
        {
            return Err(RoomError::AlreadyInRoom);
        }

        Ok(self.activate(username, connection, None).is_host)
    }

    /// Move the step forward or back, returning the new step.
    pub fn advance_step(&mut self, direction: StepDirection) -> Result<u32, RoomError> {
        if self.step == 0 {
            return Err(RoomError::NotHosted);
        }

        self.step = match direction {
            StepDirection::Next => self.step.saturating_add(1),
            StepDirection::Prev if self.step <= 1 => return Err(RoomError::FirstStep),
            StepDirection::Prev => self.step - 1,
        };
        Ok(self.step)
    }
}
