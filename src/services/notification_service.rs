use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt, stream::SelectAll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::{info, warn};

use crate::{
    dto::{
        room::PresentationNotification,
        ws::{EventFrame, NotificationJoin},
    },
    error::ServiceError,
    services::broadcast::{self as dispatch, events},
    state::{AppState, SharedState},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Group channels a notification socket listens to.
pub struct GroupSubscription {
    /// Authenticated listener.
    pub user_id: String,
    /// Groups the user joined.
    pub groups: Vec<String>,
    /// One receiver per group, in `groups` order.
    pub receivers: Vec<broadcast::Receiver<String>>,
    /// Presentations already running for the user's groups.
    pub running: Vec<PresentationNotification>,
}

/// Validate `token` and subscribe to the channel of every group its bearer joined.
pub async fn subscribe_groups(
    state: &AppState,
    token: &str,
) -> Result<GroupSubscription, ServiceError> {
    let claims = state.tokens().validate(token)?;
    let groups = state
        .require_groups()
        .await?
        .groups_for_user(claims.user_id.clone())
        .await?;

    let receivers = groups
        .iter()
        .map(|group_id| state.notifications().subscribe(group_id))
        .collect();

    let mut running = Vec::new();
    for group_id in &groups {
        if let Some(room_id) = state.registry().room_for_group(group_id).await {
            running.push(PresentationNotification {
                room_id,
                group_id: group_id.clone(),
            });
        }
    }

    Ok(GroupSubscription {
        user_id: claims.user_id,
        groups,
        receivers,
        running,
    })
}

fn encode(frame: Option<EventFrame>) -> Option<Message> {
    let frame = frame?;
    serde_json::to_string(&frame)
        .inspect_err(|err| warn!(error = %err, "failed to serialize notification"))
        .ok()
        .map(|payload| Message::Text(payload.into()))
}

/// Handle the lifecycle of a group notification socket.
///
/// The first frame must be `join(authToken)` within [`IDENT_TIMEOUT`]; afterwards the socket
/// only receives notifications.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => return,
        Ok(Some(Ok(_))) => {
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "notification socket receive error");
            return;
        }
        Ok(None) | Err(_) => {
            warn!("notification socket identification timed out");
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    let subscription = match EventFrame::from_json_str(initial_message.as_str())
        .and_then(NotificationJoin::parse)
    {
        Ok(join) => subscribe_groups(&state, &join.token).await,
        Err(err) => Err(err.into()),
    };

    let subscription = match subscription {
        Ok(subscription) => subscription,
        Err(err) => {
            warn!(error = %err, "notification subscription refused");
            if let Some(message) = encode(dispatch::frame(events::ERROR, &err.to_string())) {
                let _ = sender.send(message).await;
            }
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    let GroupSubscription {
        user_id,
        groups,
        receivers,
        running,
    } = subscription;
    info!(user_id = %user_id, groups = ?groups, "notification socket subscribed");

    for notification in &running {
        if let Some(message) = encode(dispatch::frame(events::NOTIFY, notification))
            && sender.send(message).await.is_err()
        {
            return;
        }
    }

    let mut feed: SelectAll<_> = futures::stream::select_all(
        receivers.into_iter().map(BroadcastStream::new),
    );
    let mut feed_open = !groups.is_empty();

    loop {
        tokio::select! {
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Ping(payload))) => {
                    if sender.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(user_id = %user_id, error = %err, "notification socket error");
                    break;
                }
            },
            item = feed.next(), if feed_open => match item {
                Some(Ok(payload)) => {
                    if sender.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(user_id = %user_id, skipped, "notification socket lagging, events dropped");
                }
                None => feed_open = false,
            },
        }
    }

    drop(feed);
    for group_id in &groups {
        state.notifications().prune(group_id);
    }
    info!(user_id = %user_id, "notification socket disconnected");
}
