use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use tincan_api::router::router;
use tincan_api::{AppState, AppStateInner};
use tincan_db::Store;
use tincan_gateway::dispatcher::Dispatcher;
use tincan_types::events::Envelope;
use tincan_types::topic::Topic;

fn test_app() -> (Router, AppState) {
    let state: AppState = Arc::new(AppStateInner {
        store: Store::open_in_memory().expect("in-memory store"),
        dispatcher: Dispatcher::new(),
        jwt_secret: "test-secret".into(),
    });
    (router(state.clone()), state)
}

async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn register(app: &Router, name: &str, username: &str) -> (Uuid, String) {
    let (status, body) = request(
        app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "name": name, "username": username, "password": "hunter2hunter2" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    let id = body["user"]["id"].as_str().unwrap().parse().unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    (id, token)
}

async fn create_chat(app: &Router, token: &str, other: Uuid) -> Uuid {
    let (status, body) = request(
        app,
        "POST",
        "/chat",
        Some(token),
        Some(json!({ "user_id": other })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create chat failed: {body}");
    body["id"].as_str().unwrap().parse().unwrap()
}

fn expect_event(envelope: &Envelope, topic: Topic, name: &str) {
    assert_eq!(envelope.topic, topic);
    assert_eq!(envelope.event.name(), name);
}

#[tokio::test]
async fn test_register_login_session() {
    let (app, _state) = test_app();
    let (_alice, token) = register(&app, "Alice", "alice").await;

    // Duplicate username is a conflict, short password a validation failure.
    let (status, _) = request(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "name": "Other", "username": "alice", "password": "hunter2hunter2" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = request(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "name": "Short", "username": "short", "password": "pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = request(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "hunter2hunter2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].as_str().is_some());
    assert_eq!(body["user"]["username"], "alice");

    let (status, _) = request(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = request(&app, "GET", "/auth/session", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
}

#[tokio::test]
async fn test_session_backfills_missing_username() {
    let (app, _state) = test_app();
    let (status, body) = request(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "name": "Zoë Q", "password": "hunter2hunter2" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["user"]["username"].is_null());
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = request(&app, "GET", "/auth/session", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let username = body["username"].as_str().unwrap();
    // Ascii-alphanumeric slug of the display name plus a numeric suffix.
    assert!(username.starts_with("zoq"), "got {username}");
    assert!(username.len() > "zoq".len());
}

#[tokio::test]
async fn test_protected_routes_require_auth() {
    let (app, _state) = test_app();

    let (status, _) = request(&app, "GET", "/chats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = request(&app, "GET", "/chats", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_chat_idempotent_with_fanout() {
    let (app, state) = test_app();
    let (alice, alice_token) = register(&app, "Alice", "alice").await;
    let (bob, _bob_token) = register(&app, "Bob", "bob").await;
    let (_conn, mut bob_rx) = state.dispatcher.register(bob).await;

    let chat_id = create_chat(&app, &alice_token, bob).await;

    // The other participant hears about it on their personal topic.
    let envelope = bob_rx.try_recv().expect("chat:new for bob");
    expect_event(&envelope, Topic::User(bob), "chat:new");

    // Creating again returns the same chat, without a second event.
    let (status, body) = request(
        &app,
        "POST",
        "/chat",
        Some(&alice_token),
        Some(json!({ "user_id": bob })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"].as_str().unwrap(), chat_id.to_string());
    assert!(bob_rx.try_recv().is_err());

    // Self-chat and unknown peers are rejected.
    let (status, _) = request(
        &app,
        "POST",
        "/chat",
        Some(&alice_token),
        Some(json!({ "user_id": alice })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, _) = request(
        &app,
        "POST",
        "/chat",
        Some(&alice_token),
        Some(json!({ "user_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_send_mark_seen_and_history() {
    let (app, state) = test_app();
    let (alice, alice_token) = register(&app, "Alice", "alice").await;
    let (bob, bob_token) = register(&app, "Bob", "bob").await;
    let chat_id = create_chat(&app, &alice_token, bob).await;

    let mut broadcast_rx = state.dispatcher.subscribe();
    let (_conn, mut bob_rx) = state.dispatcher.register(bob).await;

    // Send: 201, sender pre-seeded into the seen set.
    let (status, message) = request(
        &app,
        "POST",
        "/message",
        Some(&alice_token),
        Some(json!({ "chat_id": chat_id, "body": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let message_id: Uuid = message["id"].as_str().unwrap().parse().unwrap();
    assert_eq!(message["seen_by"], json!([alice.to_string()]));

    let envelope = broadcast_rx.recv().await.unwrap();
    expect_event(&envelope, Topic::Chat(chat_id), "message:new");
    let envelope = bob_rx.try_recv().expect("chat:update for bob");
    expect_event(&envelope, Topic::User(bob), "chat:update");

    // Mark seen: the seen set grows, the chat topic gets the update and the
    // caller's own chat list refreshes.
    let (status, seen) = request(
        &app,
        "PATCH",
        &format!("/message/{message_id}"),
        Some(&bob_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let seen_by: Vec<String> = seen["seen_by"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert!(seen_by.contains(&bob.to_string()));

    let envelope = broadcast_rx.recv().await.unwrap();
    expect_event(&envelope, Topic::Chat(chat_id), "message:update");
    let envelope = bob_rx.try_recv().expect("chat:update for bob after seen");
    expect_event(&envelope, Topic::User(bob), "chat:update");

    // Marking again leaves the persisted set alone but still republishes
    // the current state.
    let (status, again) = request(
        &app,
        "PATCH",
        &format!("/message/{message_id}"),
        Some(&bob_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["seen_by"], seen["seen_by"]);
    let envelope = broadcast_rx.recv().await.unwrap();
    expect_event(&envelope, Topic::Chat(chat_id), "message:update");
    let envelope = bob_rx.try_recv().expect("chat:update republished");
    expect_event(&envelope, Topic::User(bob), "chat:update");

    // Second message, then history comes back chronological.
    let (status, second) = request(
        &app,
        "POST",
        "/message",
        Some(&bob_token),
        Some(json!({ "chat_id": chat_id, "body": "yo", "reply_to": message_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["reply_to"].as_str().unwrap(), message_id.to_string());

    // History is not auth-gated; the page comes back in chronological order.
    let (status, history) = request(
        &app,
        "GET",
        &format!("/messages?chat_id={chat_id}&limit=30&page=1"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["body"], "hi");
    assert_eq!(messages[1]["body"], "yo");

    // Unknown chat ids page empty instead of erroring.
    let (status, history) = request(
        &app,
        "GET",
        &format!("/messages?chat_id={}", Uuid::new_v4()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(history["messages"].as_array().unwrap().is_empty());

    // Malformed query params are validation failures.
    let (status, _) = request(&app, "GET", "/messages", Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, _) = request(
        &app,
        "GET",
        &format!("/messages?chat_id={chat_id}&limit=abc"),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, _) = request(
        &app,
        "GET",
        &format!("/messages?chat_id={chat_id}&page=0"),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_reaction_toggle() {
    let (app, state) = test_app();
    let (_alice, alice_token) = register(&app, "Alice", "alice").await;
    let (bob, bob_token) = register(&app, "Bob", "bob").await;
    let (_carol, carol_token) = register(&app, "Carol", "carol").await;
    let chat_id = create_chat(&app, &alice_token, bob).await;

    let (_, message) = request(
        &app,
        "POST",
        "/message",
        Some(&alice_token),
        Some(json!({ "chat_id": chat_id, "body": "react to this" })),
    )
    .await;
    let message_id = message["id"].as_str().unwrap().to_string();

    let mut broadcast_rx = state.dispatcher.subscribe();

    let (status, body) = request(
        &app,
        "PATCH",
        &format!("/message/{message_id}/react"),
        Some(&bob_token),
        Some(json!({ "body": "❤️" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reactions"].as_array().unwrap().len(), 1);

    let envelope = broadcast_rx.recv().await.unwrap();
    expect_event(&envelope, Topic::Chat(chat_id), "message:update");

    // Same reaction again removes it.
    let (status, body) = request(
        &app,
        "PATCH",
        &format!("/message/{message_id}/react"),
        Some(&bob_token),
        Some(json!({ "body": "❤️" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["reactions"].as_array().unwrap().is_empty());

    // Outside the allowed set.
    let (status, _) = request(
        &app,
        "PATCH",
        &format!("/message/{message_id}/react"),
        Some(&bob_token),
        Some(json!({ "body": "🦀" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Not a participant of the chat.
    let (status, _) = request(
        &app,
        "PATCH",
        &format!("/message/{message_id}/react"),
        Some(&carol_token),
        Some(json!({ "body": "❤️" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_delete_message_sender_only() {
    let (app, state) = test_app();
    let (_alice, alice_token) = register(&app, "Alice", "alice").await;
    let (bob, bob_token) = register(&app, "Bob", "bob").await;
    let chat_id = create_chat(&app, &alice_token, bob).await;

    let (_, message) = request(
        &app,
        "POST",
        "/message",
        Some(&alice_token),
        Some(json!({ "chat_id": chat_id, "body": "short lived" })),
    )
    .await;
    let message_id = message["id"].as_str().unwrap().to_string();

    let (status, _) = request(
        &app,
        "DELETE",
        &format!("/message/{message_id}"),
        Some(&bob_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let mut broadcast_rx = state.dispatcher.subscribe();
    let (_conn, mut bob_rx) = state.dispatcher.register(bob).await;

    let (status, deleted) = request(
        &app,
        "DELETE",
        &format!("/message/{message_id}"),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["id"].as_str().unwrap(), message_id);

    let envelope = broadcast_rx.recv().await.unwrap();
    expect_event(&envelope, Topic::Chat(chat_id), "message:delete");
    let envelope = bob_rx.try_recv().expect("chat:update for bob");
    expect_event(&envelope, Topic::User(bob), "chat:update");
    // The chat is empty again, so the refresh carries no latest message.
    match envelope.event {
        tincan_types::events::SyncEvent::ChatUpdate { latest_message, .. } => {
            assert!(latest_message.is_none())
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let (status, _) = request(
        &app,
        "DELETE",
        &format!("/message/{message_id}"),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_chat() {
    let (app, state) = test_app();
    let (_alice, alice_token) = register(&app, "Alice", "alice").await;
    let (bob, bob_token) = register(&app, "Bob", "bob").await;
    let (_carol, carol_token) = register(&app, "Carol", "carol").await;
    let chat_id = create_chat(&app, &alice_token, bob).await;

    let (status, _) = request(
        &app,
        "DELETE",
        &format!("/chat/{chat_id}"),
        Some(&carol_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_conn, mut bob_rx) = state.dispatcher.register(bob).await;

    let (status, body) = request(
        &app,
        "DELETE",
        &format!("/chat/{chat_id}"),
        Some(&bob_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted_chat_id"].as_str().unwrap(), chat_id.to_string());

    let envelope = bob_rx.try_recv().expect("chat:delete for bob");
    expect_event(&envelope, Topic::User(bob), "chat:delete");

    // Gone means gone.
    let (status, _) = request(
        &app,
        "DELETE",
        &format!("/chat/{chat_id}"),
        Some(&bob_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_typing_targets_are_asymmetric() {
    let (app, state) = test_app();
    let (alice, alice_token) = register(&app, "Alice", "alice").await;
    let (bob, _bob_token) = register(&app, "Bob", "bob").await;
    let chat_id = create_chat(&app, &alice_token, bob).await;

    let mut broadcast_rx = state.dispatcher.subscribe();
    let (_conn_a, mut alice_rx) = state.dispatcher.register(alice).await;
    let (_conn_b, mut bob_rx) = state.dispatcher.register(bob).await;

    // Start goes to the other participant's personal topic only.
    let (status, _) = request(
        &app,
        "PATCH",
        &format!("/chat/{chat_id}/start-typing"),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let envelope = bob_rx.try_recv().expect("start-typing for bob");
    expect_event(&envelope, Topic::User(bob), "chat:start-typing");
    assert!(alice_rx.try_recv().is_err());
    assert!(broadcast_rx.try_recv().is_err());

    // End goes out on the chat topic.
    let (status, _) = request(
        &app,
        "PATCH",
        &format!("/chat/{chat_id}/end-typing"),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let envelope = broadcast_rx.recv().await.unwrap();
    expect_event(&envelope, Topic::Chat(chat_id), "chat:end-typing");
    assert!(bob_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_toggle_mute_statuses() {
    let (app, _state) = test_app();
    let (_alice, alice_token) = register(&app, "Alice", "alice").await;
    let (bob, _bob_token) = register(&app, "Bob", "bob").await;
    let chat_id = create_chat(&app, &alice_token, bob).await;

    let (status, body) = request(
        &app,
        "PATCH",
        &format!("/chat/{chat_id}/toggle-mute"),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Chat muted");

    // Muting shows up in the caller's chat list.
    let (_, chats) = request(&app, "GET", "/chats", Some(&alice_token), None).await;
    assert_eq!(chats[0]["muted_by"].as_array().unwrap().len(), 1);

    let (status, body) = request(
        &app,
        "PATCH",
        &format!("/chat/{chat_id}/toggle-mute"),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Chat unmuted");
}
