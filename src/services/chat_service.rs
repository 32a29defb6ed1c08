use std::time::SystemTime;

use serde_json::json;
use uuid::Uuid;

use crate::{
    dao::models::ChatMessageEntity,
    dto::{
        live::ChatMessage,
        ws::{EventFrame, TextRequest},
    },
    error::ServiceError,
    services::{
        broadcast::events,
        permission,
        room_service::{authorize, broadcast_frames, reply},
    },
    state::{AppState, SessionContext},
};

/// Persist a chat line, then relay `(username, text)` to the whole room.
pub async fn send_message(
    state: &AppState,
    context: &SessionContext,
    request: TextRequest,
) -> Result<(), ServiceError> {
    authorize(state, context, permission::ensure_member).await?;

    let store = state.require_store().await?;
    store
        .save_chat_message(ChatMessageEntity {
            id: Uuid::new_v4(),
            room_id: context.room_id.clone(),
            username: context.username.clone(),
            content: request.text.clone(),
            created_at: SystemTime::now(),
        })
        .await?;

    let frame = EventFrame::new(
        events::CHAT,
        vec![json!(context.username), json!(request.text)],
    );
    broadcast_frames(state, &context.room_id, &[frame]).await;
    Ok(())
}

/// Send the room transcript, newest last, to the requester.
pub async fn history(state: &AppState, context: &SessionContext) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let messages: Vec<ChatMessage> = store
        .list_chat_messages(context.room_id.clone())
        .await?
        .into_iter()
        .map(ChatMessage::from)
        .collect();
    reply(&context.connection, events::CHAT_HISTORY, &messages);
    Ok(())
}
