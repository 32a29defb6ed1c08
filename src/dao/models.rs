use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Latest answer a participant submitted for one question.
///
/// Records are keyed by `(username, question_id)`: a resubmission replaces the
/// previous answer instead of adding a second row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerHistoryEntity {
    /// Room (quiz) the answer was submitted in.
    pub room_id: String,
    /// Participant display name.
    pub username: String,
    /// Question being answered.
    pub question_id: String,
    /// Chosen answer option.
    pub answer_id: String,
    /// Last time the answer was (re)submitted.
    pub updated_at: SystemTime,
}

/// Number of participants that picked a given answer option.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerCountEntity {
    /// Answer option.
    pub answer_id: String,
    /// Participants whose latest answer is this option.
    pub count: u64,
}

/// Chat line posted in a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessageEntity {
    /// Message identifier.
    pub id: Uuid,
    /// Room the line was posted in.
    pub room_id: String,
    /// Author.
    pub username: String,
    /// Message text.
    pub content: String,
    /// Server time of posting.
    pub created_at: SystemTime,
}

/// Question asked by the audience during a presentation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudienceQuestionEntity {
    /// Stable identifier for the question.
    pub id: Uuid,
    /// Room the question was asked in.
    pub room_id: String,
    /// Author display name.
    pub username: String,
    /// Question text.
    pub content: String,
    /// Number of upvotes received so far.
    pub votes: u32,
    /// Whether the host marked the question as answered.
    pub answered: bool,
    pub created_at: SystemTime,
}

impl AudienceQuestionEntity {
    /// Build a fresh, unanswered question with no votes.
    pub fn new(room_id: String, username: String, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            username,
            content,
            votes: 0,
            answered: false,
            created_at: SystemTime::now(),
        }
    }
}

/// Membership state of a user in a group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    /// Accepted member.
    Joined,
    /// Invitation not answered yet.
    Pending,
    /// Invitation refused.
    Declined,
}

/// Link between a user and a group, as stored by the group directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupMembershipEntity {
    /// Group identifier.
    pub group_id: String,
    /// Member identifier, as carried in access tokens.
    pub user_id: String,
    /// Only `Joined` grants access to group rooms.
    pub status: MembershipStatus,
}
