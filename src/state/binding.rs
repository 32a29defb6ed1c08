use std::collections::HashMap;

/// Two-way index between rooms and the groups they present to.
///
/// A room is bound to at most one group and a group presents at most one room;
/// both maps always describe the same pairs.
#[derive(Debug, Default)]
pub struct GroupBindings {
    by_room: HashMap<String, String>,
    by_group: HashMap<String, String>,
}

impl GroupBindings {
    /// Bind `room_id` to `group_id`, replacing any earlier binding of either side.
    pub fn bind(&mut self, room_id: &str, group_id: &str) {
        self.unbind_room(room_id);
        if let Some(previous_room) = self.by_group.remove(group_id) {
            self.by_room.remove(&previous_room);
        }
        self.by_room.insert(room_id.to_string(), group_id.to_string());
        self.by_group.insert(group_id.to_string(), room_id.to_string());
    }

    /// Drop the binding of `room_id`, returning the group it was bound to.
    pub fn unbind_room(&mut self, room_id: &str) -> Option<String> {
        let group_id = self.by_room.remove(room_id)?;
        if self.by_group.get(&group_id).map(String::as_str) == Some(room_id) {
            self.by_group.remove(&group_id);
        }
        Some(group_id)
    }

    /// Group bound to `room_id`.
    pub fn group_of(&self, room_id: &str) -> Option<&str> {
        self.by_room.get(room_id).map(String::as_str)
    }

    /// Room bound to `group_id`.
    pub fn room_of(&self, group_id: &str) -> Option<&str> {
        self.by_group.get(group_id).map(String::as_str)
    }

    /// Number of bound rooms.
    pub fn len(&self) -> usize {
        self.by_room.len()
    }

    /// Whether no room is bound.
    pub fn is_empty(&self) -> bool {
        self.by_room.is_empty()
    }
}
