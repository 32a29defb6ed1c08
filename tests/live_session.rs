use std::{
    io,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use axum::extract::ws::Message;
use futures::future::{self, BoxFuture};
use jsonwebtoken::{EncodingKey, Header};
use quiz_live_back::{
    config::AppConfig,
    dao::{
        live_store::{
            Collaborators, LiveStore,
            memory::{InMemoryGroupDirectory, InMemoryLiveStore},
        },
        models::{AnswerCountEntity, AnswerHistoryEntity, AudienceQuestionEntity, ChatMessageEntity},
        storage::{StorageError, StorageResult},
    },
    dto::ws::EventFrame,
    services::{notification_service, websocket_service::Gateway},
    state::{AppState, ConnectionHandle, SharedState},
};
use serde_json::{Value, json};
use tokio::sync::mpsc::{self, UnboundedReceiver};

const SECRET: &str = "integration-secret";

struct Client {
    gateway: Gateway,
    rx: UnboundedReceiver<Message>,
}

impl Client {
    fn connect(state: &SharedState) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            gateway: Gateway::new(state.clone(), ConnectionHandle::new(tx)),
            rx,
        }
    }

    async fn send(&mut self, event: &str, args: Value) {
        let frame = json!({ "event": event, "args": args }).to_string();
        self.gateway.handle_text(&frame).await;
    }

    fn frames(&mut self) -> Vec<EventFrame> {
        let mut frames = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            if let Message::Text(text) = message {
                frames.push(EventFrame::from_json_str(text.as_str()).unwrap());
            }
        }
        frames
    }
}

fn frame(event: &str, arg: Value) -> EventFrame {
    EventFrame::new(event, vec![arg])
}

fn token(user_id: &str) -> String {
    let exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 3600;
    jsonwebtoken::encode(
        &Header::default(),
        &json!({ "UserID": user_id, "Email": format!("{user_id}@example.com"), "exp": exp }),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn state() -> SharedState {
    let state = AppState::new(AppConfig::default().with_jwt_secret(SECRET));
    let groups = InMemoryGroupDirectory::new();
    groups.add_member("g1", "u-alice");
    groups.add_member("g1", "u-bob");
    state
        .install_collaborators(Collaborators::new(
            Arc::new(InMemoryLiveStore::new()),
            Arc::new(groups),
        ))
        .await;
    state
}

async fn hosted_with_bob(state: &SharedState) -> (Client, Client) {
    let mut alice = Client::connect(state);
    alice.send("host", json!(["alice", "Q1", false])).await;
    let mut bob = Client::connect(state);
    bob.send("join", json!(["bob", "Q1"])).await;
    alice.frames();
    bob.frames();
    (alice, bob)
}

#[tokio::test]
async fn host_drives_steps_and_participants_follow() {
    let state = state().await;
    let mut alice = Client::connect(&state);
    alice.send("host", json!(["alice", "Q1", false])).await;
    assert_eq!(alice.frames(), [frame("getRoomState", json!(1))]);

    let mut bob = Client::connect(&state);
    bob.send("join", json!(["bob", "Q1"])).await;
    assert_eq!(bob.frames(), [frame("getRoomState", json!(1))]);

    alice.send("next", json!([])).await;
    assert_eq!(alice.frames(), [frame("getRoomState", json!(2))]);
    assert_eq!(bob.frames(), [frame("getRoomState", json!(2))]);

    bob.send("next", json!([])).await;
    assert_eq!(
        bob.frames(),
        [frame("error", json!("You are not the host of this room"))]
    );
    assert!(alice.frames().is_empty());
    assert_eq!(state.registry().get_step("Q1").await, 2);

    alice.send("prev", json!([])).await;
    assert_eq!(bob.frames(), [frame("getRoomState", json!(1))]);
    alice.frames();

    alice.send("prev", json!([])).await;
    assert_eq!(
        alice.frames(),
        [frame("error", json!("You are at the first question"))]
    );
    assert!(bob.frames().is_empty());
    assert_eq!(state.registry().get_step("Q1").await, 1);
}

#[tokio::test]
async fn resubmitted_answer_replaces_the_previous_one() {
    let state = state().await;
    let (mut alice, mut bob) = hosted_with_bob(&state).await;

    bob.send("submitAnswer", json!(["q1", "a"])).await;
    let frames = bob.frames();
    assert_eq!(frames[0], frame("notify", json!("Your answer has been submitted")));
    assert_eq!(
        frames[1],
        frame("showStatistic", json!([{ "answerId": "a", "count": 1 }]))
    );
    assert_eq!(frames[2].event, "resultList");

    let host_frames = alice.frames();
    assert_eq!(host_frames.len(), 2);
    assert_eq!(host_frames[0], frames[1]);

    bob.send("submitAnswer", json!(["q1", "b"])).await;
    assert_eq!(
        alice.frames()[0],
        frame("showStatistic", json!([{ "answerId": "b", "count": 1 }]))
    );
    let frames = bob.frames();
    assert_eq!(frames[2].args[0].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn chat_reaches_everyone_in_the_room() {
    let state = state().await;
    let (mut alice, mut bob) = hosted_with_bob(&state).await;

    bob.send("chat", json!(["hello"])).await;
    let expected = EventFrame::new("chat", vec![json!("bob"), json!("hello")]);
    assert_eq!(alice.frames(), [expected.clone()]);
    assert_eq!(bob.frames(), [expected]);

    alice.send("getChatHistory", json!([])).await;
    let history = alice.frames();
    assert_eq!(history[0].event, "chatHistory");
    assert_eq!(history[0].args[0][0]["text"], "hello");
    assert!(bob.frames().is_empty());
}

#[tokio::test]
async fn only_the_host_toggles_the_answered_marker() {
    let state = state().await;
    let (mut alice, mut bob) = hosted_with_bob(&state).await;

    bob.send("postQuestion", json!(["What is ownership?"])).await;
    let posted = alice.frames();
    assert_eq!(posted[0].event, "postQuestion");
    let question_id = posted[0].args[0]["id"].as_str().unwrap().to_string();
    bob.frames();

    bob.send("toggleUserQuestionAnswered", json!([question_id])).await;
    assert_eq!(
        bob.frames(),
        [frame("error", json!("You are not the host of this room"))]
    );
    assert!(alice.frames().is_empty());

    alice.send("toggleUserQuestionAnswered", json!([question_id])).await;
    let toggled = bob.frames();
    assert_eq!(toggled[0].event, "toggleUserQuestionAnswered");
    assert_eq!(toggled[0].args[0]["answered"], true);
}

#[tokio::test]
async fn reconnecting_participant_is_counted_once() {
    let state = state().await;
    let (_alice, bob) = hosted_with_bob(&state).await;

    let mut duplicate = Client::connect(&state);
    duplicate.send("join", json!(["bob", "Q1"])).await;
    assert_eq!(
        duplicate.frames(),
        [frame("error", json!("You are already in this room"))]
    );

    bob.gateway.close().await;
    let mut again = Client::connect(&state);
    again.send("join", json!(["bob", "Q1"])).await;
    assert_eq!(again.frames(), [frame("getRoomState", json!(1))]);

    let participants = state.registry().list_active_participants("Q1").await;
    assert_eq!(participants.len(), 2);
    assert!(participants.iter().any(|p| p.username == "alice" && p.is_host));
}

#[tokio::test]
async fn group_scoped_room_refuses_outsiders() {
    let state = state().await;
    let mut alice = Client::connect(&state);
    alice
        .send("host", json!(["alice", "Q1", true, "g1", token("u-alice")]))
        .await;
    assert_eq!(alice.frames(), [frame("getRoomState", json!(1))]);
    assert_eq!(state.registry().group_of("Q1").await.as_deref(), Some("g1"));

    let mut mallory = Client::connect(&state);
    mallory
        .send("join", json!(["mallory", "Q1", token("u-mallory")]))
        .await;
    assert_eq!(
        mallory.frames(),
        [frame("error", json!("You are not a member of group g1"))]
    );

    mallory.send("join", json!(["mallory", "Q1"])).await;
    assert_eq!(mallory.frames()[0].event, "error");

    let mut bob = Client::connect(&state);
    bob.send("join", json!(["bob", "Q1", token("u-bob")])).await;
    assert_eq!(bob.frames(), [frame("getRoomState", json!(1))]);

    let participants = state.registry().list_active_participants("Q1").await;
    assert!(participants.iter().all(|p| p.username != "mallory"));
}

#[tokio::test]
async fn cancel_reaches_room_and_group_channel() {
    let state = state().await;
    let mut subscription = notification_service::subscribe_groups(&state, &token("u-bob"))
        .await
        .unwrap();

    let mut alice = Client::connect(&state);
    alice
        .send("host", json!(["alice", "Q1", true, "g1", token("u-alice")]))
        .await;
    let mut bob = Client::connect(&state);
    bob.send("join", json!(["bob", "Q1", token("u-bob")])).await;
    bob.frames();

    let started = subscription.receivers[0].recv().await.unwrap();
    assert_eq!(
        EventFrame::from_json_str(&started).unwrap(),
        frame("notify", json!({ "roomId": "Q1", "groupId": "g1" }))
    );

    bob.send("cancelPresentation", json!(["Q1"])).await;
    assert_eq!(
        bob.frames(),
        [frame("error", json!("You are not the host of this room"))]
    );

    alice.send("cancelPresentation", json!(["Q1"])).await;
    assert_eq!(bob.frames(), [frame("cancelPresentation", json!("Q1"))]);
    let cancelled = subscription.receivers[0].recv().await.unwrap();
    assert_eq!(
        EventFrame::from_json_str(&cancelled).unwrap(),
        frame("cancelPresentation", json!("Q1"))
    );

    assert!(state.registry().list_active_room_ids().await.is_empty());
    assert_eq!(state.registry().room_for_group("g1").await, None);
}

#[tokio::test]
async fn last_departure_tears_down_room_and_binding() {
    let state = state().await;
    let mut alice = Client::connect(&state);
    alice
        .send("host", json!(["alice", "Q1", true, "g1", token("u-alice")]))
        .await;
    let mut bob = Client::connect(&state);
    bob.send("join", json!(["bob", "Q1", token("u-bob")])).await;

    alice.gateway.close().await;
    assert_eq!(state.registry().list_active_room_ids().await, ["Q1"]);

    bob.send("manualDisconnect", json!([])).await;
    bob.gateway.close().await;

    assert!(state.registry().list_active_room_ids().await.is_empty());
    assert_eq!(state.registry().group_of("Q1").await, None);
    assert_eq!(state.registry().room_for_group("g1").await, None);

    let mut carol = Client::connect(&state);
    carol.send("getRoomActive", json!([])).await;
    assert_eq!(carol.frames(), [frame("getRoomActive", json!([]))]);
}

#[tokio::test]
async fn renaming_on_one_socket_leaves_no_ghost_participant() {
    let state = state().await;
    let mut socket = Client::connect(&state);
    socket
        .send("host", json!(["bob", "Q1", true, "g1", token("u-bob")]))
        .await;
    socket.send("join", json!(["carol", "Q1", token("u-bob")])).await;
    assert_eq!(socket.gateway.session().map(|s| s.username.as_str()), Some("carol"));

    let names: Vec<_> = state
        .registry()
        .list_active_participants("Q1")
        .await
        .into_iter()
        .map(|p| p.username)
        .collect();
    assert_eq!(names, ["carol"]);

    socket.gateway.close().await;
    assert!(state.registry().list_active_room_ids().await.is_empty());
    assert_eq!(state.registry().room_for_group("g1").await, None);
}

/// Store whose backend is unreachable for every call.
struct UnreachableStore;

fn unreachable_backend<T: Send + 'static>() -> BoxFuture<'static, StorageResult<T>> {
    Box::pin(future::ready(Err(StorageError::unavailable(
        "connection refused".into(),
        io::Error::other("backend down"),
    ))))
}

impl LiveStore for UnreachableStore {
    fn upsert_answer(&self, _: AnswerHistoryEntity) -> BoxFuture<'static, StorageResult<()>> {
        unreachable_backend()
    }
    fn count_answers_by_question(
        &self,
        _: String,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerCountEntity>>> {
        unreachable_backend()
    }
    fn list_answer_history_by_question(
        &self,
        _: String,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerHistoryEntity>>> {
        unreachable_backend()
    }
    fn save_chat_message(&self, _: ChatMessageEntity) -> BoxFuture<'static, StorageResult<()>> {
        unreachable_backend()
    }
    fn list_chat_messages(
        &self,
        _: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>> {
        unreachable_backend()
    }
    fn upsert_audience_question(
        &self,
        _: AudienceQuestionEntity,
    ) -> BoxFuture<'static, StorageResult<AudienceQuestionEntity>> {
        unreachable_backend()
    }
    fn list_audience_questions(
        &self,
        _: String,
    ) -> BoxFuture<'static, StorageResult<Vec<AudienceQuestionEntity>>> {
        unreachable_backend()
    }
    fn upvote_audience_question(
        &self,
        _: String,
        _: uuid::Uuid,
    ) -> BoxFuture<'static, StorageResult<AudienceQuestionEntity>> {
        unreachable_backend()
    }
    fn toggle_audience_question_answered(
        &self,
        _: String,
        _: uuid::Uuid,
    ) -> BoxFuture<'static, StorageResult<AudienceQuestionEntity>> {
        unreachable_backend()
    }
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        unreachable_backend()
    }
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        unreachable_backend()
    }
}

async fn assert_room_untouched(state: &SharedState) {
    assert_eq!(state.registry().get_step("Q1").await, 1);
    let names: Vec<_> = state
        .registry()
        .list_active_participants("Q1")
        .await
        .into_iter()
        .map(|p| p.username)
        .collect();
    assert_eq!(names, ["alice", "bob"]);
}

#[tokio::test]
async fn degraded_storage_errors_reach_only_the_sender() {
    let state = state().await;
    let (mut alice, mut bob) = hosted_with_bob(&state).await;
    state.clear_collaborators().await;

    for (event, args) in [
        ("submitAnswer", json!(["q1", "a"])),
        ("chat", json!(["hello"])),
        ("postQuestion", json!(["Anyone?"])),
    ] {
        bob.send(event, args).await;
        assert_eq!(
            bob.frames(),
            [frame("error", json!("storage unavailable (degraded mode)"))],
            "{event}"
        );
        assert!(alice.frames().is_empty(), "{event}");
    }
    assert_room_untouched(&state).await;

    alice.send("next", json!([])).await;
    assert_eq!(bob.frames(), [frame("getRoomState", json!(2))]);
}

#[tokio::test]
async fn failing_store_reports_collaborator_error() {
    let state = AppState::new(AppConfig::default().with_jwt_secret(SECRET));
    state
        .install_collaborators(Collaborators::new(
            Arc::new(UnreachableStore),
            Arc::new(InMemoryGroupDirectory::new()),
        ))
        .await;
    let (mut alice, mut bob) = hosted_with_bob(&state).await;

    for (event, args) in [
        ("submitAnswer", json!(["q1", "a"])),
        ("chat", json!(["hello"])),
        ("postQuestion", json!(["Anyone?"])),
    ] {
        bob.send(event, args).await;
        let frames = bob.frames();
        assert_eq!(frames.len(), 1, "{event}");
        assert_eq!(frames[0].event, "error");
        assert!(
            frames[0].args[0]
                .as_str()
                .is_some_and(|message| message.starts_with("collaborator call failed")),
            "{event}: {:?}",
            frames[0]
        );
        assert!(alice.frames().is_empty(), "{event}");
    }
    assert_room_untouched(&state).await;
}
