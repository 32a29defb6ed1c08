//! Payloads of answer statistics, chat and audience questions.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{
    AnswerCountEntity, AnswerHistoryEntity, AudienceQuestionEntity, ChatMessageEntity,
};
use crate::dto::format_system_time;

/// How many participants picked one answer option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerCount {
    /// Answer option.
    pub answer_id: String,
    /// Number of participants that picked it.
    pub count: u64,
}

impl From<AnswerCountEntity> for AnswerCount {
    fn from(entity: AnswerCountEntity) -> Self {
        Self {
            answer_id: entity.answer_id,
            count: entity.count,
        }
    }
}

/// One participant's latest answer to a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    /// Participant who answered.
    pub username: String,
    /// Question the answer belongs to.
    pub question_id: String,
    /// Latest answer option picked.
    pub answer_id: String,
    /// RFC 3339 timestamp of the last submission.
    pub updated_at: String,
}

impl From<AnswerHistoryEntity> for AnswerRecord {
    fn from(entity: AnswerHistoryEntity) -> Self {
        Self {
            username: entity.username,
            question_id: entity.question_id,
            answer_id: entity.answer_id,
            updated_at: format_system_time(entity.updated_at),
        }
    }
}

/// Chat line as relayed to room members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message identifier.
    pub id: Uuid,
    /// Author.
    pub username: String,
    /// Message body.
    pub text: String,
    /// RFC 3339 posting time.
    pub created_at: String,
}

impl From<ChatMessageEntity> for ChatMessage {
    fn from(entity: ChatMessageEntity) -> Self {
        Self {
            id: entity.id,
            username: entity.username,
            text: entity.content,
            created_at: format_system_time(entity.created_at),
        }
    }
}

/// Audience question with its vote count and answered marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AudienceQuestion {
    /// Question identifier, used by upvotes and toggles.
    pub id: Uuid,
    /// Room the question was asked in.
    pub room_id: String,
    /// Participant who asked.
    pub username: String,
    /// Question body.
    pub text: String,
    /// Upvotes received.
    pub votes: u32,
    /// Set by the host once addressed.
    pub answered: bool,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl From<AudienceQuestionEntity> for AudienceQuestion {
    fn from(entity: AudienceQuestionEntity) -> Self {
        Self {
            id: entity.id,
            room_id: entity.room_id,
            username: entity.username,
            text: entity.content,
            votes: entity.votes,
            answered: entity.answered,
            created_at: format_system_time(entity.created_at),
        }
    }
}
