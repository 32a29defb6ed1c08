use std::collections::{BTreeMap, HashSet};

use dashmap::DashMap;
use futures::future::{self, BoxFuture};
use uuid::Uuid;

use super::{GroupDirectory, LiveStore};
use crate::dao::{
    models::{
        AnswerCountEntity, AnswerHistoryEntity, AudienceQuestionEntity, ChatMessageEntity,
        GroupMembershipEntity, MembershipStatus,
    },
    storage::{StorageError, StorageResult},
};

/// Process-local live store used for development and tests.
#[derive(Default)]
pub struct InMemoryLiveStore {
    /// Keyed by `(username, question_id)`.
    answers: DashMap<(String, String), AnswerHistoryEntity>,
    chats: DashMap<String, Vec<ChatMessageEntity>>,
    questions: DashMap<Uuid, AudienceQuestionEntity>,
}

impl InMemoryLiveStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn update_question<F>(
        &self,
        room_id: &str,
        question_id: Uuid,
        apply: F,
    ) -> StorageResult<AudienceQuestionEntity>
    where
        F: FnOnce(&mut AudienceQuestionEntity),
    {
        let mut entry = self
            .questions
            .get_mut(&question_id)
            .filter(|question| question.room_id == room_id)
            .ok_or_else(|| StorageError::not_found("audience question", question_id.to_string()))?;
        apply(entry.value_mut());
        Ok(entry.clone())
    }
}

impl LiveStore for InMemoryLiveStore {
    fn upsert_answer(&self, answer: AnswerHistoryEntity) -> BoxFuture<'static, StorageResult<()>> {
        let key = (answer.username.clone(), answer.question_id.clone());
        self.answers.insert(key, answer);
        Box::pin(future::ready(Ok(())))
    }

    fn count_answers_by_question(
        &self,
        question_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerCountEntity>>> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for entry in self.answers.iter() {
            if entry.question_id == question_id {
                *counts.entry(entry.answer_id.clone()).or_default() += 1;
            }
        }
        let counts = counts
            .into_iter()
            .map(|(answer_id, count)| AnswerCountEntity { answer_id, count })
            .collect();
        Box::pin(future::ready(Ok(counts)))
    }

    fn list_answer_history_by_question(
        &self,
        question_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerHistoryEntity>>> {
        let mut history: Vec<_> = self
            .answers
            .iter()
            .filter(|entry| entry.question_id == question_id)
            .map(|entry| entry.value().clone())
            .collect();
        history.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.username.cmp(&b.username))
        });
        Box::pin(future::ready(Ok(history)))
    }

    fn save_chat_message(
        &self,
        message: ChatMessageEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.chats
            .entry(message.room_id.clone())
            .or_default()
            .push(message);
        Box::pin(future::ready(Ok(())))
    }

    fn list_chat_messages(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>> {
        let messages = self
            .chats
            .get(&room_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        Box::pin(future::ready(Ok(messages)))
    }

    fn upsert_audience_question(
        &self,
        question: AudienceQuestionEntity,
    ) -> BoxFuture<'static, StorageResult<AudienceQuestionEntity>> {
        self.questions.insert(question.id, question.clone());
        Box::pin(future::ready(Ok(question)))
    }

    fn list_audience_questions(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<AudienceQuestionEntity>>> {
        let mut questions: Vec<_> = self
            .questions
            .iter()
            .filter(|entry| entry.room_id == room_id)
            .map(|entry| entry.value().clone())
            .collect();
        questions.sort_by_key(|question| question.created_at);
        Box::pin(future::ready(Ok(questions)))
    }

    fn upvote_audience_question(
        &self,
        room_id: String,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<AudienceQuestionEntity>> {
        let result = self.update_question(&room_id, question_id, |question| {
            question.votes = question.votes.saturating_add(1);
        });
        Box::pin(future::ready(result))
    }

    fn toggle_audience_question_answered(
        &self,
        room_id: String,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<AudienceQuestionEntity>> {
        let result = self.update_question(&room_id, question_id, |question| {
            question.answered = !question.answered;
        });
        Box::pin(future::ready(result))
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(Ok(())))
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(Ok(())))
    }
}

/// Group directory backed by a fixed membership list.
#[derive(Default)]
pub struct InMemoryGroupDirectory {
    /// Joined members per group.
    members: DashMap<String, HashSet<String>>,
}

impl InMemoryGroupDirectory {
    /// Directory with no groups.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the directory from membership records, keeping only joined ones.
    pub fn from_memberships(memberships: impl IntoIterator<Item = GroupMembershipEntity>) -> Self {
        let directory = Self::new();
        for membership in memberships {
            if membership.status == MembershipStatus::Joined {
                directory.add_member(&membership.group_id, &membership.user_id);
            }
        }
        directory
    }

    /// Register `user_id` as a joined member of `group_id`.
    pub fn add_member(&self, group_id: &str, user_id: &str) {
        self.members
            .entry(group_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    /// Drop `user_id` from `group_id`; unknown pairs are ignored.
    pub fn remove_member(&self, group_id: &str, user_id: &str) {
        if let Some(mut members) = self.members.get_mut(group_id) {
            members.remove(user_id);
        }
    }
}

impl GroupDirectory for InMemoryGroupDirectory {
    fn is_user_in_group(
        &self,
        group_id: String,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let member = self
            .members
            .get(&group_id)
            .is_some_and(|members| members.contains(&user_id));
        Box::pin(future::ready(Ok(member)))
    }

    fn groups_for_user(&self, user_id: String) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let mut groups: Vec<String> = self
            .members
            .iter()
            .filter(|entry| entry.value().contains(&user_id))
            .map(|entry| entry.key().clone())
            .collect();
        groups.sort();
        Box::pin(future::ready(Ok(groups)))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    fn answer(username: &str, question: &str, option: &str) -> AnswerHistoryEntity {
        AnswerHistoryEntity {
            room_id: "Q1".into(),
            username: username.into(),
            question_id: question.into(),
            answer_id: option.into(),
            updated_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn resubmitted_answer_overwrites_previous_choice() {
        let store = InMemoryLiveStore::new();
        store.upsert_answer(answer("bob", "q1", "a")).await.unwrap();
        store.upsert_answer(answer("carol", "q1", "a")).await.unwrap();
        store.upsert_answer(answer("bob", "q1", "b")).await.unwrap();

        let counts = store.count_answers_by_question("q1".into()).await.unwrap();
        assert_eq!(
            counts,
            vec![
                AnswerCountEntity {
                    answer_id: "a".into(),
                    count: 1
                },
                AnswerCountEntity {
                    answer_id: "b".into(),
                    count: 1
                },
            ]
        );

        let history = store
            .list_answer_history_by_question("q1".into())
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn counts_are_scoped_to_the_question() {
        let store = InMemoryLiveStore::new();
        store.upsert_answer(answer("bob", "q1", "a")).await.unwrap();
        store.upsert_answer(answer("bob", "q2", "a")).await.unwrap();

        let counts = store.count_answers_by_question("q2".into()).await.unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].count, 1);
    }

    #[tokio::test]
    async fn chat_transcript_is_returned_in_insertion_order() {
        let store = InMemoryLiveStore::new();
        let base = SystemTime::now();
        for (offset, text) in ["first", "second"].into_iter().enumerate() {
            store
                .save_chat_message(ChatMessageEntity {
                    id: Uuid::new_v4(),
                    room_id: "Q1".into(),
                    username: "bob".into(),
                    content: text.into(),
                    created_at: base + Duration::from_millis(offset as u64),
                })
                .await
                .unwrap();
        }

        let transcript = store.list_chat_messages("Q1".into()).await.unwrap();
        let contents: Vec<_> = transcript.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert!(store.list_chat_messages("Q2".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn question_updates_are_scoped_to_their_room() {
        let store = InMemoryLiveStore::new();
        let question = store
            .upsert_audience_question(AudienceQuestionEntity::new(
                "Q1".into(),
                "bob".into(),
                "why?".into(),
            ))
            .await
            .unwrap();

        let upvoted = store
            .upvote_audience_question("Q1".into(), question.id)
            .await
            .unwrap();
        assert_eq!(upvoted.votes, 1);

        let toggled = store
            .toggle_audience_question_answered("Q1".into(), question.id)
            .await
            .unwrap();
        assert!(toggled.answered);

        let err = store
            .upvote_audience_question("Q2".into(), question.id)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn directory_only_counts_joined_memberships() {
        let directory = InMemoryGroupDirectory::from_memberships([
            GroupMembershipEntity {
                group_id: "g1".into(),
                user_id: "u1".into(),
                status: MembershipStatus::Joined,
            },
            GroupMembershipEntity {
                group_id: "g2".into(),
                user_id: "u1".into(),
                status: MembershipStatus::Pending,
            },
        ]);

        assert!(
            directory
                .is_user_in_group("g1".into(), "u1".into())
                .await
                .unwrap()
        );
        assert!(
            !directory
                .is_user_in_group("g2".into(), "u1".into())
                .await
                .unwrap()
        );
        assert_eq!(
            directory.groups_for_user("u1".into()).await.unwrap(),
            vec!["g1".to_string()]
        );
    }
}
