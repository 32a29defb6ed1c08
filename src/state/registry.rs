use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    services::permission,
    state::{
        ConnectionHandle, SessionContext,
        binding::GroupBindings,
        room::{Participant, Room, RoomError},
    },
};

/// A participant that went away, as reported by [`SessionRegistry::leave_room`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// Room that was left.
    pub room_id: String,
    /// Participant marked departed.
    pub username: String,
    /// The room lost its last participant and was removed.
    pub torn_down: bool,
}

/// Result of [`SessionRegistry::cancel_room`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// No such room; nothing happened.
    NotActive,
    /// Room removed; members were notified.
    Cancelled {
        /// Group the room was bound to, whose channel must hear about it.
        group_id: Option<String>,
    },
}

/// Read-only copy of a room used by query endpoints.
#[derive(Debug, Clone)]
pub struct RoomView {
    /// Room identifier.
    pub room_id: String,
    /// Current step, `0` before hosting.
    pub step: u32,
    /// Group binding, if any.
    pub group_id: Option<String>,
    /// Active participants in arrival order.
    pub participants: Vec<Participant>,
}

/// Owner of every live room, the connection index and the group bindings.
///
/// Each room sits behind its own lock so rooms progress independently. When both are
/// needed, a room lock is always taken before the bindings lock.
pub struct SessionRegistry {
    rooms: DashMap<String, Arc<Mutex<Room>>>,
    connections: DashMap<Uuid, String>,
    bindings: Mutex<GroupBindings>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// Registry with no rooms.
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            connections: DashMap::new(),
            bindings: Mutex::new(GroupBindings::default()),
        }
    }

    /// Host `room_id`, creating it when absent.
    ///
    /// With a `group_id` the room becomes group scoped; without one any earlier group
    /// binding of the room is dropped.
    pub async fn host_room(
        &self,
        room_id: &str,
        username: &str,
        connection: ConnectionHandle,
        group_id: Option<&str>,
    ) -> Result<SessionContext, RoomError> {
        let mut room = self.lock_or_create(room_id).await;
        let hosted = {
            let mut bindings = self.bindings.lock().await;
            match group_id.and_then(|group_id| {
                bindings
                    .room_of(group_id)
                    .filter(|current| *current != room_id)
                    .map(|current| (group_id, current))
            }) {
                Some((group_id, current)) => Err(RoomError::GroupBusy {
                    group_id: group_id.to_string(),
                    room_id: current.to_string(),
                }),
                None => room.claim_host(username, connection.clone()).map(|()| {
                    match group_id {
                        Some(group_id) => bindings.bind(room_id, group_id),
                        None => {
                            bindings.unbind_room(room_id);
                        }
                    }
                }),
            }
        };

        if let Err(err) = hosted {
            self.discard_if_empty(&mut room).await;
            return Err(err);
        }

        let context = SessionContext::new(room_id, username, true, connection);
        drop(room);
        self.track_connection(&context).await;
        info!(room_id, username, group_id = ?group_id, "room hosted");
        Ok(context)
    }

    /// Add `username` to `room_id`, creating an un-hosted room when absent.
    pub async fn join_room(
        &self,
        room_id: &str,
        username: &str,
        connection: ConnectionHandle,
    ) -> Result<SessionContext, RoomError> {
        let mut room = self.lock_or_create(room_id).await;
        let is_host = match room.admit(username, connection.clone()) {
            Ok(is_host) => is_host,
            Err(err) => {
                self.discard_if_empty(&mut room).await;
                return Err(err);
            }
        };

        let context = SessionContext::new(room_id, username, is_host, connection);
        drop(room);
        self.track_connection(&context).await;
        debug!(room_id, username, is_host, "participant joined");
        Ok(context)
    }

    /// Release whatever the connection holds. Safe to call more than once.
    pub async fn leave_room(&self, connection_id: Uuid) -> Option<Departure> {
        let (_, room_id) = self.connections.remove(&connection_id)?;
        self.release_from(&room_id, connection_id).await
    }

    /// Tear the room down on behalf of its host.
    ///
    /// The caller's session must still own its participant record, so a socket superseded
    /// by a reconnect cannot cancel. `notify` runs under the room lock before removal so
    /// members hear about the cancellation before the room disappears.
    pub async fn cancel_room<F>(
        &self,
        room_id: &str,
        context: &SessionContext,
        notify: F,
    ) -> Result<CancelOutcome, RoomError>
    where
        F: FnOnce(&Room),
    {
        let Some(mut room) = self.lock_existing(room_id).await else {
            return Ok(CancelOutcome::NotActive);
        };
        permission::ensure_session(&room, context)?;
        permission::ensure_can_cancel(&room, &context.username)?;

        notify(&room);
        let group_id = self.tear_down(&mut room).await;
        info!(room_id, username = %context.username, group_id = ?group_id, "room cancelled");
        Ok(CancelOutcome::Cancelled { group_id })
    }

    /// Run `f` on the live room while holding its lock.
    pub async fn with_room<R>(&self, room_id: &str, f: impl FnOnce(&mut Room) -> R) -> Option<R> {
        let mut room = self.lock_existing(room_id).await?;
        Some(f(&mut room))
    }

    /// Current step of the room; `0` for unknown or un-hosted rooms.
    pub async fn get_step(&self, room_id: &str) -> u32 {
        self.with_room(room_id, |room| room.step())
            .await
            .unwrap_or(0)
    }

    /// Identifiers of rooms with at least one active participant, sorted.
    pub async fn list_active_room_ids(&self) -> Vec<String> {
        let handles: Vec<_> = self
            .rooms
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut active = Vec::with_capacity(handles.len());
        for handle in handles {
            let room = handle.lock().await;
            if !room.is_torn_down() && room.has_active() {
                active.push(room.id().to_string());
            }
        }
        active.sort();
        active
    }

    /// Active participants of the room in arrival order; empty when the room is unknown.
    pub async fn list_active_participants(&self, room_id: &str) -> Vec<Participant> {
        self.with_room(room_id, |room| room.active_participants().cloned().collect())
            .await
            .unwrap_or_default()
    }

    /// Group bound to `room_id`.
    pub async fn group_of(&self, room_id: &str) -> Option<String> {
        self.bindings.lock().await.group_of(room_id).map(str::to_string)
    }

    /// Room currently presented to `group_id`.
    pub async fn room_for_group(&self, group_id: &str) -> Option<String> {
        self.bindings.lock().await.room_of(group_id).map(str::to_string)
    }

    /// Snapshot of a live room with its group binding.
    pub async fn view(&self, room_id: &str) -> Option<RoomView> {
        let room = self.lock_existing(room_id).await?;
        let group_id = self.bindings.lock().await.group_of(room_id).map(str::to_string);
        Some(RoomView {
            room_id: room.id().to_string(),
            step: room.step(),
            group_id,
            participants: room.active_participants().cloned().collect(),
        })
    }

    /// Room the connection currently belongs to.
    pub fn room_of_connection(&self, connection_id: Uuid) -> Option<String> {
        self.connections
            .get(&connection_id)
            .map(|entry| entry.value().clone())
    }

    async fn lock_or_create(&self, room_id: &str) -> OwnedMutexGuard<Room> {
        loop {
            let handle = self
                .rooms
                .entry(room_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Room::new(room_id))))
                .clone();
            let room = handle.clone().lock_owned().await;
            if !room.is_torn_down() {
                return room;
            }
            // Lost a race with a teardown; the entry is gone or about to be replaced.
            self.rooms
                .remove_if(room_id, |_, current| Arc::ptr_eq(current, &handle));
        }
    }

    async fn lock_existing(&self, room_id: &str) -> Option<OwnedMutexGuard<Room>> {
        let handle = self.rooms.get(room_id).map(|entry| entry.value().clone())?;
        let room = handle.lock_owned().await;
        (!room.is_torn_down()).then_some(room)
    }

    /// Record which room the connection is in, releasing the room it was in before.
    async fn track_connection(&self, context: &SessionContext) {
        let previous = self
            .connections
            .insert(context.connection.id, context.room_id.clone());
        if let Some(previous) = previous.filter(|previous| *previous != context.room_id) {
            debug!(
                connection = %context.connection.id,
                from = %previous,
                to = %context.room_id,
                "connection switched rooms"
            );
            self.release_from(&previous, context.connection.id).await;
        }
    }

    async fn release_from(&self, room_id: &str, connection_id: Uuid) -> Option<Departure> {
        let mut room = self.lock_existing(room_id).await?;
        let username = room.release(connection_id)?.username.clone();
        let torn_down = !room.has_active();
        if torn_down {
            self.tear_down(&mut room).await;
        }

        debug!(room_id, username = %username, torn_down, "participant left");
        Some(Departure {
            room_id: room_id.to_string(),
            username,
            torn_down,
        })
    }

    async fn discard_if_empty(&self, room: &mut OwnedMutexGuard<Room>) {
        if room.is_empty() {
            self.tear_down(room).await;
        }
    }

    /// Remove the room and everything indexed under it. Caller holds the room lock.
    async fn tear_down(&self, room: &mut OwnedMutexGuard<Room>) -> Option<String> {
        room.mark_torn_down();
        let room_id = room.id().to_string();
        let handle = OwnedMutexGuard::mutex(room).clone();
        self.rooms
            .remove_if(&room_id, |_, current| Arc::ptr_eq(current, &handle));
        for connection_id in room.connection_ids() {
            self.connections
                .remove_if(&connection_id, |_, current| *current == room_id);
        }
        let group_id = self.bindings.lock().await.unbind_room(&room_id);
        info!(room_id = %room_id, group_id = ?group_id, "room torn down");
        group_id
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn connection() -> ConnectionHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        ConnectionHandle::new(tx)
    }

    #[tokio::test]
    async fn last_departure_tears_room_down() {
        let registry = SessionRegistry::new();
        let alice = connection();
        let bob = connection();
        registry
            .host_room("Q1", "alice", alice.clone(), Some("g1"))
            .await
            .unwrap();
        registry.join_room("Q1", "bob", bob.clone()).await.unwrap();

        let departure = registry.leave_room(alice.id).await.unwrap();
        assert!(!departure.torn_down);
        assert_eq!(registry.list_active_room_ids().await, ["Q1"]);

        let departure = registry.leave_room(bob.id).await.unwrap();
        assert_eq!(
            departure,
            Departure {
                room_id: "Q1".into(),
                username: "bob".into(),
                torn_down: true,
            }
        );
        assert!(registry.list_active_room_ids().await.is_empty());
        assert_eq!(registry.get_step("Q1").await, 0);
        assert_eq!(registry.group_of("Q1").await, None);
        assert_eq!(registry.room_for_group("g1").await, None);
        assert!(registry.connections.is_empty());
    }

    #[tokio::test]
    async fn leave_is_idempotent() {
        let registry = SessionRegistry::new();
        let bob = connection();
        registry.join_room("Q1", "bob", bob.clone()).await.unwrap();

        assert!(registry.leave_room(bob.id).await.is_some());
        assert!(registry.leave_room(bob.id).await.is_none());
        assert!(registry.leave_room(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn reconnect_reuses_participant_record() {
        let registry = SessionRegistry::new();
        let alice = connection();
        let bob = connection();
        registry.host_room("Q1", "alice", alice, None).await.unwrap();
        registry.join_room("Q1", "bob", bob.clone()).await.unwrap();
        registry.leave_room(bob.id).await;

        let context = registry
            .join_room("Q1", "bob", connection())
            .await
            .unwrap();
        assert!(!context.is_host);

        let names: Vec<_> = registry
            .list_active_participants("Q1")
            .await
            .into_iter()
            .map(|p| p.username)
            .collect();
        assert_eq!(names, ["alice", "bob"]);
    }

    #[tokio::test]
    async fn duplicate_username_is_refused_while_active() {
        let registry = SessionRegistry::new();
        registry.join_room("Q1", "bob", connection()).await.unwrap();

        assert!(matches!(
            registry.join_room("Q1", "bob", connection()).await,
            Err(RoomError::AlreadyInRoom)
        ));
        assert_eq!(registry.list_active_participants("Q1").await.len(), 1);
    }

    #[tokio::test]
    async fn group_presenting_another_room_refuses_host() {
        let registry = SessionRegistry::new();
        registry
            .host_room("Q1", "alice", connection(), Some("g1"))
            .await
            .unwrap();

        let err = registry
            .host_room("Q2", "carol", connection(), Some("g1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::GroupBusy { .. }));
        // The room created for the refused attempt does not linger.
        assert_eq!(registry.list_active_room_ids().await, ["Q1"]);
        assert!(registry.rooms.get("Q2").is_none());
    }

    #[tokio::test]
    async fn rehost_without_group_clears_binding() {
        let registry = SessionRegistry::new();
        let alice = connection();
        registry
            .host_room("Q1", "alice", alice.clone(), Some("g1"))
            .await
            .unwrap();
        registry.host_room("Q1", "alice", alice, None).await.unwrap();

        assert_eq!(registry.group_of("Q1").await, None);
        assert_eq!(registry.room_for_group("g1").await, None);
    }

    #[tokio::test]
    async fn switching_rooms_releases_previous_room() {
        let registry = SessionRegistry::new();
        let bob = connection();
        registry.join_room("Q1", "bob", bob.clone()).await.unwrap();
        registry.join_room("Q2", "bob", bob.clone()).await.unwrap();

        assert_eq!(registry.list_active_room_ids().await, ["Q2"]);
        assert_eq!(registry.room_of_connection(bob.id).as_deref(), Some("Q2"));
    }

    #[tokio::test]
    async fn cancel_requires_host_and_notifies_before_removal() {
        let registry = SessionRegistry::new();
        let alice = registry
            .host_room("Q1", "alice", connection(), Some("g1"))
            .await
            .unwrap();
        let bob = registry.join_room("Q1", "bob", connection()).await.unwrap();

        assert_eq!(
            registry.cancel_room("Q1", &bob, |_| {}).await,
            Err(RoomError::NotHost)
        );

        let mut notified = Vec::new();
        let outcome = registry
            .cancel_room("Q1", &alice, |room| {
                notified = room
                    .active_participants()
                    .map(|p| p.username.clone())
                    .collect();
            })
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CancelOutcome::Cancelled {
                group_id: Some("g1".into())
            }
        );
        assert_eq!(notified, ["alice", "bob"]);
        assert!(registry.list_active_room_ids().await.is_empty());
        assert_eq!(
            registry.cancel_room("Q1", &alice, |_| {}).await,
            Ok(CancelOutcome::NotActive)
        );
    }

    #[tokio::test]
    async fn superseded_host_socket_cannot_cancel() {
        let registry = SessionRegistry::new();
        let old = connection();
        let stale = registry
            .host_room("Q1", "alice", old.clone(), None)
            .await
            .unwrap();
        registry.join_room("Q1", "bob", connection()).await.unwrap();
        registry.leave_room(old.id).await;
        let fresh = registry
            .host_room("Q1", "alice", connection(), None)
            .await
            .unwrap();

        assert_eq!(
            registry.cancel_room("Q1", &stale, |_| {}).await,
            Err(RoomError::NotInRoom)
        );
        assert_eq!(registry.list_active_room_ids().await, ["Q1"]);

        assert!(matches!(
            registry.cancel_room("Q1", &fresh, |_| {}).await,
            Ok(CancelOutcome::Cancelled { .. })
        ));
    }

    #[tokio::test]
    async fn second_username_on_one_connection_replaces_the_first() {
        let registry = SessionRegistry::new();
        let socket = connection();
        registry
            .host_room("Q1", "alice", connection(), Some("g1"))
            .await
            .unwrap();
        registry.join_room("Q1", "bob", socket.clone()).await.unwrap();
        registry.join_room("Q1", "carol", socket.clone()).await.unwrap();

        let names: Vec<_> = registry
            .list_active_participants("Q1")
            .await
            .into_iter()
            .map(|p| p.username)
            .collect();
        assert_eq!(names, ["alice", "carol"]);

        registry.leave_room(socket.id).await;
        assert_eq!(
            registry
                .list_active_participants("Q1")
                .await
                .into_iter()
                .map(|p| p.username)
                .collect::<Vec<_>>(),
            ["alice"]
        );
    }

    #[tokio::test]
    async fn renamed_connection_leaving_tears_room_down() {
        let registry = SessionRegistry::new();
        let socket = connection();
        registry
            .host_room("Q1", "bob", socket.clone(), Some("g1"))
            .await
            .unwrap();
        registry.join_room("Q1", "carol", socket.clone()).await.unwrap();

        let departure = registry.leave_room(socket.id).await.unwrap();
        assert!(departure.torn_down);
        assert!(registry.list_active_room_ids().await.is_empty());
        assert_eq!(registry.room_for_group("g1").await, None);
    }

    #[tokio::test]
    async fn concurrent_joins_and_leaves_keep_counts_exact() {
        let registry = Arc::new(SessionRegistry::new());
        registry
            .host_room("Q1", "host", connection(), None)
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for i in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let handle = connection();
                registry
                    .join_room("Q1", &format!("user-{i}"), handle.clone())
                    .await
                    .unwrap();
                if i % 2 == 0 {
                    registry.leave_room(handle.id).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.list_active_participants("Q1").await.len(), 17);
    }

    #[tokio::test]
    async fn rejoin_after_teardown_creates_fresh_room() {
        let registry = SessionRegistry::new();
        let alice = connection();
        registry
            .host_room("Q1", "alice", alice.clone(), None)
            .await
            .unwrap();
        let _ = registry
            .with_room("Q1", |room| {
                room.advance_step(crate::dto::ws::StepDirection::Next)
            })
            .await;
        registry.leave_room(alice.id).await;

        registry.join_room("Q1", "bob", connection()).await.unwrap();
        assert_eq!(registry.get_step("Q1").await, 0);
    }
}
