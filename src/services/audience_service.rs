use tracing::info;
use uuid::Uuid;

use crate::{
    dao::{live_store::LiveStore, models::AudienceQuestionEntity},
    dto::{live::AudienceQuestion, ws::TextRequest},
    error::ServiceError,
    services::{
        broadcast::{self, events},
        permission,
        room_service::{authorize, broadcast_frames, reply},
    },
    state::{AppState, SessionContext},
};

async fn load_questions(
    store: &dyn LiveStore,
    room_id: &str,
) -> Result<Vec<AudienceQuestion>, ServiceError> {
    Ok(store
        .list_audience_questions(room_id.to_string())
        .await?
        .into_iter()
        .map(AudienceQuestion::from)
        .collect())
}

/// Ask a question; the room receives the new record and the refreshed list.
pub async fn post_question(
    state: &AppState,
    context: &SessionContext,
    request: TextRequest,
) -> Result<(), ServiceError> {
    authorize(state, context, permission::ensure_member).await?;

    let store = state.require_store().await?;
    let question = store
        .upsert_audience_question(AudienceQuestionEntity::new(
            context.room_id.clone(),
            context.username.clone(),
            request.text,
        ))
        .await?;
    let questions = load_questions(store.as_ref(), &context.room_id).await?;

    let frames: Vec<_> = [
        broadcast::frame(events::POST_QUESTION, &AudienceQuestion::from(question)),
        broadcast::frame(events::LIST_USER_QUESTION, &questions),
    ]
    .into_iter()
    .flatten()
    .collect();
    broadcast_frames(state, &context.room_id, &frames).await;
    Ok(())
}

/// Reply with the audience questions of the caller's room.
pub async fn list_questions(state: &AppState, context: &SessionContext) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let questions = load_questions(store.as_ref(), &context.room_id).await?;
    reply(&context.connection, events::LIST_USER_QUESTION, &questions);
    Ok(())
}

/// Add one vote and broadcast the updated question.
pub async fn upvote_question(
    state: &AppState,
    context: &SessionContext,
    question_id: Uuid,
) -> Result<(), ServiceError> {
    authorize(state, context, permission::ensure_member).await?;

    let store = state.require_store().await?;
    let question = store
        .upvote_audience_question(context.room_id.clone(), question_id)
        .await?;

    if let Some(frame) = broadcast::frame(events::UPVOTE_QUESTION, &AudienceQuestion::from(question)) {
        broadcast_frames(state, &context.room_id, &[frame]).await;
    }
    Ok(())
}

/// Flip the answered marker of a question. Host only.
pub async fn toggle_answered(
    state: &AppState,
    context: &SessionContext,
    question_id: Uuid,
) -> Result<(), ServiceError> {
    authorize(state, context, permission::ensure_can_toggle_answered_marker).await?;

    let store = state.require_store().await?;
    let question = store
        .toggle_audience_question_answered(context.room_id.clone(), question_id)
        .await?;
    info!(
        room_id = %context.room_id,
        %question_id,
        answered = question.answered,
        "audience question marker toggled"
    );

    if let Some(frame) = broadcast::frame(
        events::TOGGLE_USER_QUESTION_ANSWERED,
        &AudienceQuestion::from(question),
    ) {
        broadcast_frames(state, &context.room_id, &[frame]).await;
    }
    Ok(())
}
