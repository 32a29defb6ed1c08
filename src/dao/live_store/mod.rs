/// MongoDB backed collaborators.
#[cfg(feature = "mongo-store")]
pub mod mongodb;
/// In-process collaborators for tests and local runs.
pub mod memory;

use std::sync::Arc;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    AnswerCountEntity, AnswerHistoryEntity, AudienceQuestionEntity, ChatMessageEntity,
};
use crate::dao::storage::StorageResult;

/// Durable side of a live session: answer history, chat transcript and audience questions.
///
/// The engine never caches what lives here; every read goes back to the store.
pub trait LiveStore: Send + Sync {
    /// Insert or overwrite the answer of `(username, question_id)`.
    fn upsert_answer(&self, answer: AnswerHistoryEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Per-option answer counts for a question, ordered by answer identifier.
    fn count_answers_by_question(
        &self,
        question_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerCountEntity>>>;
    /// Every recorded answer for a question, oldest first.
    fn list_answer_history_by_question(
        &self,
        question_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerHistoryEntity>>>;
    /// Append a chat line to its room transcript.
    fn save_chat_message(&self, message: ChatMessageEntity)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Room transcript, newest last.
    fn list_chat_messages(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>>;
    /// Insert or replace a question by identifier.
    fn upsert_audience_question(
        &self,
        question: AudienceQuestionEntity,
    ) -> BoxFuture<'static, StorageResult<AudienceQuestionEntity>>;
    /// Audience questions of a room, oldest first.
    fn list_audience_questions(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<AudienceQuestionEntity>>>;
    /// Add one vote to a question of `room_id` and return the updated record.
    fn upvote_audience_question(
        &self,
        room_id: String,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<AudienceQuestionEntity>>;
    /// Flip the answered marker of a question of `room_id` and return the updated record.
    fn toggle_audience_question_answered(
        &self,
        room_id: String,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<AudienceQuestionEntity>>;
    /// Cheap round trip used by the storage supervisor.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Source of truth for group membership, owned by the group management service.
pub trait GroupDirectory: Send + Sync {
    /// Whether `user_id` is a joined member of `group_id`.
    fn is_user_in_group(
        &self,
        group_id: String,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Groups `user_id` has joined.
    fn groups_for_user(&self, user_id: String) -> BoxFuture<'static, StorageResult<Vec<String>>>;
}

/// Collaborator handles installed together once a backend is reachable.
#[derive(Clone)]
pub struct Collaborators {
    /// Answers, chat and audience questions.
    pub store: Arc<dyn LiveStore>,
    /// Group membership lookups.
    pub groups: Arc<dyn GroupDirectory>,
}

impl Collaborators {
    /// Bundle a store and a group directory.
    pub fn new(store: Arc<dyn LiveStore>, groups: Arc<dyn GroupDirectory>) -> Self {
        Self { store, groups }
    }
}
