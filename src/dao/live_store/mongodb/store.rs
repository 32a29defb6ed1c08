use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Document, doc},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        ANSWER_COLLECTION_NAME, CHAT_COLLECTION_NAME, MEMBERSHIP_COLLECTION_NAME,
        MongoAnswerCount, MongoAnswerDocument, MongoChatDocument, MongoQuestionDocument,
        QUESTION_COLLECTION_NAME,
    },
};
use crate::dao::{
    live_store::{GroupDirectory, LiveStore},
    models::{
        AnswerCountEntity, AnswerHistoryEntity, AudienceQuestionEntity, ChatMessageEntity,
        GroupMembershipEntity,
    },
    storage::{StorageError, StorageResult},
};

/// MongoDB-backed live store and group directory.
#[derive(Clone)]
pub struct MongoLiveStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoLiveStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;
        let indexes: [(&'static str, &'static str, Document, bool); 4] = [
            (
                ANSWER_COLLECTION_NAME,
                "username,question_id",
                doc! {"username": 1, "question_id": 1},
                true,
            ),
            (
                CHAT_COLLECTION_NAME,
                "room_id,created_at",
                doc! {"room_id": 1, "created_at": 1},
                false,
            ),
            (
                QUESTION_COLLECTION_NAME,
                "room_id,created_at",
                doc! {"room_id": 1, "created_at": 1},
                false,
            ),
            (
                MEMBERSHIP_COLLECTION_NAME,
                "user_id,group_id",
                doc! {"user_id": 1, "group_id": 1},
                false,
            ),
        ];

        for (collection, index, keys, unique) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(Some(format!("{collection}_{}_idx", index.replace(',', "_"))))
                        .unique(Some(unique))
                        .build(),
                )
                .build();

            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn answers(&self) -> Collection<MongoAnswerDocument> {
        self.database().await.collection(ANSWER_COLLECTION_NAME)
    }

    async fn chats(&self) -> Collection<MongoChatDocument> {
        self.database().await.collection(CHAT_COLLECTION_NAME)
    }

    async fn questions(&self) -> Collection<MongoQuestionDocument> {
        self.database().await.collection(QUESTION_COLLECTION_NAME)
    }

    async fn memberships(&self) -> Collection<GroupMembershipEntity> {
        self.database().await.collection(MEMBERSHIP_COLLECTION_NAME)
    }

    async fn upsert_answer(&self, answer: AnswerHistoryEntity) -> MongoResult<()> {
        let filter = doc! {"username": answer.username.clone(), "question_id": answer.question_id.clone()};
        let username = answer.username.clone();
        let question_id = answer.question_id.clone();
        let document: MongoAnswerDocument = answer.into();

        self.answers()
            .await
            .replace_one(filter, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveAnswer {
                username,
                question_id,
                source,
            })?;
        Ok(())
    }

    async fn count_answers(&self, question_id: String) -> MongoResult<Vec<AnswerCountEntity>> {
        let pipeline = vec![
            doc! {"$match": {"question_id": question_id.clone()}},
            doc! {"$group": {"_id": "$answer_id", "count": {"$sum": 1}}},
            doc! {"$sort": {"_id": 1}},
        ];

        let rows: Vec<MongoAnswerCount> = self
            .answers()
            .await
            .aggregate(pipeline)
            .with_type::<MongoAnswerCount>()
            .await
            .map_err(|source| MongoDaoError::LoadAnswers {
                question_id: question_id.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadAnswers {
                question_id: question_id.clone(),
                source,
            })?;

        Ok(rows
            .into_iter()
            .map(|row| AnswerCountEntity {
                answer_id: row.answer_id,
                count: u64::try_from(row.count).unwrap_or_default(),
            })
            .collect())
    }

    async fn list_answers(&self, question_id: String) -> MongoResult<Vec<AnswerHistoryEntity>> {
        let documents: Vec<MongoAnswerDocument> = self
            .answers()
            .await
            .find(doc! {"question_id": question_id.clone()})
            .sort(doc! {"updated_at": 1, "username": 1})
            .await
            .map_err(|source| MongoDaoError::LoadAnswers {
                question_id: question_id.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadAnswers {
                question_id: question_id.clone(),
                source,
            })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn save_chat(&self, message: ChatMessageEntity) -> MongoResult<()> {
        let room_id = message.room_id.clone();
        let document: MongoChatDocument = message.into();
        self.chats()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveChat { room_id, source })?;
        Ok(())
    }

    async fn list_chats(&self, room_id: String) -> MongoResult<Vec<ChatMessageEntity>> {
        let documents: Vec<MongoChatDocument> = self
            .chats()
            .await
            .find(doc! {"room_id": room_id.clone()})
            .sort(doc! {"created_at": 1})
            .await
            .map_err(|source| MongoDaoError::LoadChat {
                room_id: room_id.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadChat {
                room_id: room_id.clone(),
                source,
            })?;

        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn upsert_question(
        &self,
        question: AudienceQuestionEntity,
    ) -> MongoResult<AudienceQuestionEntity> {
        let id = question.id.to_string();
        let document: MongoQuestionDocument = question.clone().into();
        self.questions()
            .await
            .replace_one(doc! {"_id": id.clone()}, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveQuestion { id, source })?;
        Ok(question)
    }

    async fn list_questions(&self, room_id: String) -> MongoResult<Vec<AudienceQuestionEntity>> {
        let documents: Vec<MongoQuestionDocument> = self
            .questions()
            .await
            .find(doc! {"room_id": room_id.clone()})
            .sort(doc! {"created_at": 1})
            .await
            .map_err(|source| MongoDaoError::LoadQuestions {
                room_id: room_id.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadQuestions {
                room_id: room_id.clone(),
                source,
            })?;

        documents.into_iter().map(TryInto::try_into).collect()
    }

    /// Apply `update` to a question of `room_id` and return the post-update record.
    async fn update_question(
        &self,
        room_id: String,
        question_id: Uuid,
        update: impl Into<mongodb::options::UpdateModifications>,
    ) -> StorageResult<AudienceQuestionEntity> {
        let id = question_id.to_string();
        let updated = self
            .questions()
            .await
            .find_one_and_update(doc! {"_id": id.clone(), "room_id": room_id.clone()}, update)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::SaveQuestion {
                id: id.clone(),
                source,
            })?;

        match updated {
            Some(document) => Ok(document.try_into()?),
            None => Err(StorageError::not_found("audience question", id)),
        }
    }

    async fn is_member(&self, group_id: String, user_id: String) -> MongoResult<bool> {
        let count = self
            .memberships()
            .await
            .count_documents(doc! {"group_id": group_id.clone(), "user_id": user_id.clone(), "status": "joined"})
            .await
            .map_err(|source| MongoDaoError::LoadMemberships {
                user_id: user_id.clone(),
                source,
            })?;
        Ok(count > 0)
    }

    async fn joined_groups(&self, user_id: String) -> MongoResult<Vec<String>> {
        let memberships: Vec<GroupMembershipEntity> = self
            .memberships()
            .await
            .find(doc! {"user_id": user_id.clone(), "status": "joined"})
            .sort(doc! {"group_id": 1})
            .await
            .map_err(|source| MongoDaoError::LoadMemberships {
                user_id: user_id.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadMemberships {
                user_id: user_id.clone(),
                source,
            })?;

        Ok(memberships
            .into_iter()
            .map(|membership| membership.group_id)
            .collect())
    }
}

impl LiveStore for MongoLiveStore {
    fn upsert_answer(&self, answer: AnswerHistoryEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_answer(answer).await.map_err(Into::into) })
    }

    fn count_answers_by_question(
        &self,
        question_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerCountEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.count_answers(question_id).await.map_err(Into::into) })
    }

    fn list_answer_history_by_question(
        &self,
        question_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerHistoryEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_answers(question_id).await.map_err(Into::into) })
    }

    fn save_chat_message(
        &self,
        message: ChatMessageEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_chat(message).await.map_err(Into::into) })
    }

    fn list_chat_messages(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_chats(room_id).await.map_err(Into::into) })
    }

    fn upsert_audience_question(
        &self,
        question: AudienceQuestionEntity,
    ) -> BoxFuture<'static, StorageResult<AudienceQuestionEntity>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_question(question).await.map_err(Into::into) })
    }

    fn list_audience_questions(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<AudienceQuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_questions(room_id).await.map_err(Into::into) })
    }

    fn upvote_audience_question(
        &self,
        room_id: String,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<AudienceQuestionEntity>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_question(room_id, question_id, doc! {"$inc": {"votes": 1}})
                .await
        })
    }

    fn toggle_audience_question_answered(
        &self,
        room_id: String,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<AudienceQuestionEntity>> {
        let store = self.clone();
        Box::pin(async move {
            // Pipeline update: negates the stored flag server-side.
            let flip = vec![doc! {"$set": {"answered": {"$not": ["$answered"]}}}];
            store.update_question(room_id, question_id, flip).await
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}

impl GroupDirectory for MongoLiveStore {
    fn is_user_in_group(
        &self,
        group_id: String,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.is_member(group_id, user_id).await.map_err(Into::into) })
    }

    fn groups_for_user(&self, user_id: String) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let store = self.clone();
        Box::pin(async move { store.joined_groups(user_id).await.map_err(Into::into) })
    }
}
