use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    dto::ws::{ClientCommand, EventFrame},
    error::ServiceError,
    services::{answer_service, audience_service, broadcast, chat_service, room_service},
    state::{AppState, ConnectionHandle, SessionContext, SharedState},
};

/// What the read loop does after a frame was handled.
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading frames.
    Continue,
    /// Close the socket.
    Disconnect,
}

/// One room socket: the connection and the session it acquired, if any.
///
/// Frames are handled one at a time, in arrival order.
pub struct Gateway {
    state: SharedState,
    connection: ConnectionHandle,
    session: Option<SessionContext>,
}

impl Gateway {
    /// Fresh gateway for an accepted socket, with no session yet.
    pub fn new(state: SharedState, connection: ConnectionHandle) -> Self {
        Self {
            state,
            connection,
            session: None,
        }
    }

    /// Socket this gateway reads from.
    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// Session acquired by `host` or `join`, if any.
    pub fn session(&self) -> Option<&SessionContext> {
        self.session.as_ref()
    }

    /// Handle one inbound text frame. Failures are answered with an `error` event to
    /// this connection only; the connection stays open.
    pub async fn handle_text(&mut self, text: &str) -> Flow {
        match self.dispatch(text).await {
            Ok(flow) => flow,
            Err(err) => {
                warn!(
                    connection_id = %self.connection.id,
                    room_id = ?self.session.as_ref().map(|s| s.room_id.as_str()),
                    error = %err,
                    "event refused"
                );
                match broadcast::send_error(&self.connection, &err.to_string()) {
                    Ok(()) => Flow::Continue,
                    Err(_) => Flow::Disconnect,
                }
            }
        }
    }

    /// Release the connection's participant record. Runs on every disconnect path and is a
    /// no-op when the connection never joined a room.
    pub async fn close(mut self) {
        self.session.take();
        room_service::leave(&self.state, &self.connection).await;
    }

    async fn dispatch(&mut self, text: &str) -> Result<Flow, ServiceError> {
        let command = ClientCommand::parse(EventFrame::from_json_str(text)?)?;
        if command.allowed_without_room() {
            return self.handle_entry(command).await;
        }

        let state = self.state.as_ref();
        let context = self
            .session
            .as_ref()
            .ok_or_else(|| ServiceError::Permission("You are not in any room".into()))?;
        if let ClientCommand::CancelPresentation { room_id } = &command {
            room_service::cancel(state, context, room_id).await?;
            if *room_id == context.room_id {
                self.session = None;
            }
        } else {
            handle_in_room(state, context, command).await?;
        }
        Ok(Flow::Continue)
    }

    /// Commands accepted before the connection has a session.
    async fn handle_entry(&mut self, command: ClientCommand) -> Result<Flow, ServiceError> {
        let state = self.state.as_ref();
        match command {
            ClientCommand::Host(request) => {
                self.session = Some(room_service::host(state, &self.connection, request).await?);
            }
            ClientCommand::Join(request) => {
                self.session = Some(room_service::join(state, &self.connection, request).await?);
            }
            ClientCommand::GetRoomActive => {
                room_service::active_rooms(state, &self.connection).await;
            }
            ClientCommand::GetSlidePresentation { group_id } => {
                room_service::slide_presentation(state, &self.connection, &group_id).await?;
            }
            ClientCommand::ManualDisconnect => return Ok(Flow::Disconnect),
            _ => {}
        }
        Ok(Flow::Continue)
    }
}

/// Commands that need a session.
async fn handle_in_room(
    state: &AppState,
    context: &SessionContext,
    command: ClientCommand,
) -> Result<(), ServiceError> {
    match command {
        ClientCommand::Step(direction) => {
            room_service::step(state, context, direction).await?;
        }
        ClientCommand::GetRoomState => room_service::room_state(state, context).await,
        ClientCommand::GetActiveParticipants => {
            room_service::active_participants(state, context).await
        }
        ClientCommand::SubmitAnswer(request) => {
            answer_service::submit_answer(state, context, request).await?
        }
        ClientCommand::ShowStatistic { question_id } => {
            answer_service::show_statistic(state, context, &question_id).await?
        }
        ClientCommand::Chat(request) => chat_service::send_message(state, context, request).await?,
        ClientCommand::GetChatHistory => chat_service::history(state, context).await?,
        ClientCommand::PostQuestion(request) => {
            audience_service::post_question(state, context, request).await?
        }
        ClientCommand::ListUserQuestion => audience_service::list_questions(state, context).await?,
        ClientCommand::UpvoteQuestion { question_id } => {
            audience_service::upvote_question(state, context, question_id).await?
        }
        ClientCommand::ToggleUserQuestionAnswered { question_id } => {
            audience_service::toggle_answered(state, context, question_id).await?
        }
        ClientCommand::Host(_)
        | ClientCommand::Join(_)
        | ClientCommand::GetRoomActive
        | ClientCommand::GetSlidePresentation { .. }
        | ClientCommand::CancelPresentation { .. }
        | ClientCommand::ManualDisconnect => {}
    }
    Ok(())
}

/// Handle the full lifecycle for an individual room WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sender.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    let connection = ConnectionHandle::new(outbound_tx);
    info!(connection_id = %connection.id, "room socket connected");
    let mut gateway = Gateway::new(state, connection.clone());

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if gateway.handle_text(text.as_str()).await == Flow::Disconnect {
                    info!(connection_id = %connection.id, "manual disconnect");
                    break;
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = connection.tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(_)) => {
                info!(connection_id = %connection.id, "room socket closed by peer");
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(connection_id = %connection.id, error = %err, "websocket error");
                break;
            }
        }
    }

    gateway.close().await;
    info!(connection_id = %connection.id, "room socket disconnected");

    finalize(writer_task, connection).await;
}

/// Stop the writer. Room records may still hold clones of the sender, so the writer is told
/// to stop with a close frame instead of waiting for the channel to drain.
async fn finalize(writer_task: JoinHandle<()>, connection: ConnectionHandle) {
    let _ = connection.tx.send(Message::Close(None));
    drop(connection);
    let _ = writer_task.await;
}
