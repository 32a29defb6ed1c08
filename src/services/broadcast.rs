//! Fan-out of outbound frames to single connections, rooms and group channels.

use axum::extract::ws::Message;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    dto::ws::EventFrame,
    state::{ConnectionHandle, NotificationHub, room::Room},
};

/// Outbound event names.
pub mod events {
    /// Error reply to the sender.
    pub const ERROR: &str = "error";
    /// Group channel push.
    pub const NOTIFY: &str = "notify";
    /// Current step.
    pub const ROOM_STATE: &str = "getRoomState";
    /// Active room identifiers.
    pub const ROOM_ACTIVE: &str = "getRoomActive";
    /// Active participant list.
    pub const ACTIVE_PARTICIPANTS: &str = "getActiveParticipants";
    /// Answer counts of a question.
    pub const SHOW_STATISTIC: &str = "showStatistic";
    /// Per-participant answers of a question.
    pub const RESULT_LIST: &str = "resultList";
    /// One chat line.
    pub const CHAT: &str = "chat";
    /// Chat transcript.
    pub const CHAT_HISTORY: &str = "chatHistory";
    /// New audience question.
    pub const POST_QUESTION: &str = "postQuestion";
    /// Audience questions of the room.
    pub const LIST_USER_QUESTION: &str = "listUserQuestion";
    /// Question after an upvote.
    pub const UPVOTE_QUESTION: &str = "upvoteQuestion";
    /// Question after its answered marker flipped.
    pub const TOGGLE_USER_QUESTION_ANSWERED: &str = "toggleUserQuestionAnswered";
    /// Room cancelled by its host.
    pub const CANCEL_PRESENTATION: &str = "cancelPresentation";
    /// Room presented to a group.
    pub const SLIDE_PRESENTATION: &str = "getSlidePresentation";
}

/// The writer side of the connection is gone.
#[derive(Debug, Error)]
#[error("connection closed")]
pub struct ConnectionClosed;

/// Serialize `frame`, logging failures. A frame that cannot be serialized is dropped.
fn encode(frame: &EventFrame) -> Option<String> {
    match serde_json::to_string(frame) {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(event = %frame.event, error = %err, "failed to serialize frame, dropping it");
            None
        }
    }
}

/// Build a one-argument frame, logging serialization failures.
pub fn frame<T>(event: &str, payload: &T) -> Option<EventFrame>
where
    T: ?Sized + Serialize,
{
    EventFrame::single(event, payload)
        .inspect_err(|err| warn!(event, error = %err, "failed to serialize payload"))
        .ok()
}

/// Queue `frame` on one connection.
pub fn send_frame(connection: &ConnectionHandle, frame: &EventFrame) -> Result<(), ConnectionClosed> {
    let Some(payload) = encode(frame) else {
        return Ok(());
    };
    connection
        .tx
        .send(Message::Text(payload.into()))
        .map_err(|_| ConnectionClosed)
}

/// Send a one-argument event to one connection.
pub fn send_to_connection<T>(
    connection: &ConnectionHandle,
    event: &str,
    payload: &T,
) -> Result<(), ConnectionClosed>
where
    T: ?Sized + Serialize,
{
    match frame(event, payload) {
        Some(frame) => send_frame(connection, &frame),
        None => Ok(()),
    }
}

/// Report a refused action to its originator only.
pub fn send_error(connection: &ConnectionHandle, message: &str) -> Result<(), ConnectionClosed> {
    send_to_connection(connection, events::ERROR, message)
}

/// Deliver `frame` to every active participant of `room`, sender included.
///
/// Call with the room lock held so frames reach each connection in room order.
pub fn broadcast_to_room(room: &Room, frame: &EventFrame) -> usize {
    let Some(payload) = encode(frame) else {
        return 0;
    };

    let mut delivered = 0;
    for participant in room.active_participants() {
        if participant
            .connection
            .tx
            .send(Message::Text(payload.clone().into()))
            .is_ok()
        {
            delivered += 1;
        } else {
            debug!(
                room_id = room.id(),
                username = %participant.username,
                "skipping closed connection"
            );
        }
    }
    delivered
}

/// Deliver `frame` to every subscriber of the group's notification channel.
pub fn broadcast_to_group_channel(hub: &NotificationHub, group_id: &str, frame: &EventFrame) -> usize {
    match encode(frame) {
        Some(payload) => hub.publish(group_id, payload),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;

    fn text(message: Message) -> EventFrame {
        match message {
            Message::Text(text) => EventFrame::from_json_str(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn room_broadcast_reaches_active_participants_only() {
        let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
        let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
        let bob = ConnectionHandle::new(bob_tx);
        let mut room = Room::new("Q1");
        room.claim_host("alice", ConnectionHandle::new(alice_tx)).unwrap();
        room.admit("bob", bob.clone()).unwrap();
        room.release(bob.id);

        let frame = EventFrame::new(events::ROOM_STATE, vec![json!(1)]);
        assert_eq!(broadcast_to_room(&room, &frame), 1);

        assert_eq!(text(alice_rx.try_recv().unwrap()), frame);
        assert!(bob_rx.try_recv().is_err());
    }

    #[test]
    fn error_goes_to_originator() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = ConnectionHandle::new(tx);
        send_error(&connection, "You are not the host of this room").unwrap();

        assert_eq!(
            text(rx.try_recv().unwrap()),
            EventFrame::new(events::ERROR, vec![json!("You are not the host of this room")])
        );
    }

    #[test]
    fn closed_connection_is_reported() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let connection = ConnectionHandle::new(tx);
        assert!(send_error(&connection, "bye").is_err());
    }

    #[tokio::test]
    async fn group_broadcast_uses_notification_hub() {
        let hub = NotificationHub::new(4);
        let mut receiver = hub.subscribe("g1");
        let frame = EventFrame::new(events::NOTIFY, vec![json!("hello")]);

        assert_eq!(broadcast_to_group_channel(&hub, "g1", &frame), 1);
        let payload = receiver.recv().await.unwrap();
        assert_eq!(EventFrame::from_json_str(&payload).unwrap(), frame);
    }
}
