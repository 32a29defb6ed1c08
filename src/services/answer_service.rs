use std::time::SystemTime;

use tracing::debug;

use crate::{
    dao::{live_store::LiveStore, models::AnswerHistoryEntity},
    dto::{
        live::{AnswerCount, AnswerRecord},
        ws::SubmitAnswerRequest,
    },
    error::ServiceError,
    services::{
        broadcast::{self, events},
        permission,
        room_service::{authorize, broadcast_frames, reply},
    },
    state::{AppState, SessionContext},
};

/// Message sent back to a participant once their answer is stored.
pub const ANSWER_SUBMITTED: &str = "Your answer has been submitted";

/// Record the participant's answer and broadcast refreshed statistics to the room.
///
/// Counts are always recomputed from the store, so a resubmission replaces the earlier
/// answer instead of being counted twice.
pub async fn submit_answer(
    state: &AppState,
    context: &SessionContext,
    request: SubmitAnswerRequest,
) -> Result<(), ServiceError> {
    authorize(state, context, permission::ensure_member).await?;

    let store = state.require_store().await?;
    store
        .upsert_answer(AnswerHistoryEntity {
            room_id: context.room_id.clone(),
            username: context.username.clone(),
            question_id: request.question_id.clone(),
            answer_id: request.answer_id,
            updated_at: SystemTime::now(),
        })
        .await?;
    reply(&context.connection, events::NOTIFY, ANSWER_SUBMITTED);

    publish_statistics(state, store.as_ref(), &context.room_id, &request.question_id).await
}

/// Re-broadcast the statistics of a question without a new submission.
pub async fn show_statistic(
    state: &AppState,
    context: &SessionContext,
    question_id: &str,
) -> Result<(), ServiceError> {
    authorize(state, context, permission::ensure_member).await?;
    let store = state.require_store().await?;
    publish_statistics(state, store.as_ref(), &context.room_id, question_id).await
}

async fn publish_statistics(
    state: &AppState,
    store: &dyn LiveStore,
    room_id: &str,
    question_id: &str,
) -> Result<(), ServiceError> {
    let counts: Vec<AnswerCount> = store
        .count_answers_by_question(question_id.to_string())
        .await?
        .into_iter()
        .map(AnswerCount::from)
        .collect();
    let history: Vec<AnswerRecord> = store
        .list_answer_history_by_question(question_id.to_string())
        .await?
        .into_iter()
        .map(AnswerRecord::from)
        .collect();

    debug!(room_id, question_id, options = counts.len(), answers = history.len(), "publishing statistics");
    let frames: Vec<_> = [
        broadcast::frame(events::SHOW_STATISTIC, &counts),
        broadcast::frame(events::RESULT_LIST, &history),
    ]
    .into_iter()
    .flatten()
    .collect();
    broadcast_frames(state, room_id, &frames).await;
    Ok(())
}
