use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::dao::models::{AnswerHistoryEntity, AudienceQuestionEntity, ChatMessageEntity};

pub const ANSWER_COLLECTION_NAME: &str = "answer_histories";
pub const CHAT_COLLECTION_NAME: &str = "chat_messages";
pub const QUESTION_COLLECTION_NAME: &str = "audience_questions";
pub const MEMBERSHIP_COLLECTION_NAME: &str = "user_groups";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAnswerDocument {
    room_id: String,
    username: String,
    question_id: String,
    answer_id: String,
    updated_at: DateTime,
}

impl From<AnswerHistoryEntity> for MongoAnswerDocument {
    fn from(value: AnswerHistoryEntity) -> Self {
        Self {
            room_id: value.room_id,
            username: value.username,
            question_id: value.question_id,
            answer_id: value.answer_id,
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoAnswerDocument> for AnswerHistoryEntity {
    fn from(value: MongoAnswerDocument) -> Self {
        Self {
            room_id: value.room_id,
            username: value.username,
            question_id: value.question_id,
            answer_id: value.answer_id,
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

/// Output row of the per-option counting pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct MongoAnswerCount {
    #[serde(rename = "_id")]
    pub answer_id: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoChatDocument {
    #[serde(rename = "_id")]
    id: String,
    room_id: String,
    username: String,
    content: String,
    created_at: DateTime,
}

impl From<ChatMessageEntity> for MongoChatDocument {
    fn from(value: ChatMessageEntity) -> Self {
        Self {
            id: value.id.to_string(),
            room_id: value.room_id,
            username: value.username,
            content: value.content,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoChatDocument> for ChatMessageEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoChatDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id(CHAT_COLLECTION_NAME, &value.id)?,
            room_id: value.room_id,
            username: value.username,
            content: value.content,
            created_at: value.created_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuestionDocument {
    #[serde(rename = "_id")]
    id: String,
    room_id: String,
    username: String,
    content: String,
    votes: i64,
    answered: bool,
    created_at: DateTime,
}

impl From<AudienceQuestionEntity> for MongoQuestionDocument {
    fn from(value: AudienceQuestionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            room_id: value.room_id,
            username: value.username,
            content: value.content,
            votes: i64::from(value.votes),
            answered: value.answered,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoQuestionDocument> for AudienceQuestionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoQuestionDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id(QUESTION_COLLECTION_NAME, &value.id)?,
            room_id: value.room_id,
            username: value.username,
            content: value.content,
            votes: u32::try_from(value.votes.max(0)).unwrap_or(u32::MAX),
            answered: value.answered,
            created_at: value.created_at.to_system_time(),
        })
    }
}

fn parse_id(collection: &'static str, raw: &str) -> Result<Uuid, MongoDaoError> {
    Uuid::parse_str(raw).map_err(|_| MongoDaoError::MalformedDocument {
        collection,
        id: raw.to_owned(),
    })
}
