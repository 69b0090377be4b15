use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use tincan_types::api::{HistoryQuery, HistoryResponse, Identity, SendMessageRequest};
use tincan_types::events::SyncEvent;
use tincan_types::models::Message;
use tincan_types::topic::Topic;

use crate::AppState;
use crate::chats::member_chat_row;
use crate::error::ApiError;
use crate::hydrate;

pub async fn send_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat_row = member_chat_row(&state, req.chat_id, identity.id)?;

    // A reply may only target a message in the same chat.
    if let Some(reply_to) = req.reply_to {
        let target = state
            .store
            .message_by_id(&reply_to.to_string())?
            .ok_or_else(|| ApiError::validation("reply target does not exist"))?;
        if target.chat_id != req.chat_id.to_string() {
            return Err(ApiError::validation(
                "reply target belongs to a different chat",
            ));
        }
    }

    let message_id = Uuid::new_v4();

    // Run the blocking insert and hydration off the async runtime.
    let db_state = state.clone();
    let mid = message_id.to_string();
    let cid = req.chat_id.to_string();
    let sid = identity.id.to_string();
    let body = req.body.clone();
    let image = req.image.clone();
    let reply_to = req.reply_to.map(|id| id.to_string());
    let message = tokio::task::spawn_blocking(move || {
        db_state.store.insert_message(
            &mid,
            &cid,
            &sid,
            body.as_deref(),
            image.as_deref(),
            reply_to.as_deref(),
        )?;
        let row = db_state
            .store
            .message_by_id(&mid)?
            .ok_or_else(|| anyhow::anyhow!("message {} vanished after insert", mid))?;
        hydrate::message_from_row(&db_state.store, row)
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {e}")))??;

    // The chat topic gets the message itself; both personal topics get the
    // chat-list refresh.
    state
        .dispatcher
        .publish(
            Topic::Chat(req.chat_id),
            SyncEvent::MessageNew {
                message: message.clone(),
            },
        )
        .await;
    let update = SyncEvent::ChatUpdate {
        chat_id: req.chat_id,
        latest_message: Some(message.clone()),
    };
    for raw in [chat_row.user_a, chat_row.user_b] {
        state
            .dispatcher
            .publish(Topic::User(hydrate::parse_id(&raw)?), update.clone())
            .await;
    }

    Ok((StatusCode::CREATED, Json(message)))
}

/// Paged history for one chat. Pages are fetched newest-first and returned
/// in chronological order within the page. No auth is enforced on this route
/// and an unknown chat id yields an empty page rather than an error.
pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let chat_id: Uuid = query
        .chat_id
        .as_deref()
        .ok_or_else(|| ApiError::validation("chat_id is required"))?
        .parse()
        .map_err(|_| ApiError::validation("chat_id must be a UUID"))?;
    let limit = parse_positive(query.limit.as_deref(), 30, "limit")?.min(100);
    let page = parse_positive(query.page.as_deref(), 1, "page")?;

    let offset = (page - 1)
        .checked_mul(limit)
        .ok_or_else(|| ApiError::validation("page out of range"))?;

    let db_state = state.clone();
    let cid = chat_id.to_string();
    let mut messages = tokio::task::spawn_blocking(move || {
        let rows = db_state.store.messages_page(&cid, limit, offset)?;
        hydrate::messages_from_rows(&db_state.store, rows)
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {e}")))??;

    messages.reverse();

    Ok(Json(HistoryResponse {
        chat_id,
        page,
        messages,
    }))
}

/// Add the caller to a message's seen set. Repeats are a persistence no-op,
/// but current state goes back out either way so clients can resync off it.
pub async fn mark_seen(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .store
        .message_by_id(&message_id.to_string())?
        .ok_or_else(|| ApiError::not_found("message"))?;
    let chat_id = hydrate::parse_id(&row.chat_id)?;
    let chat_row = member_chat_row(&state, chat_id, identity.id)?;

    state
        .store
        .mark_seen(&message_id.to_string(), &identity.id.to_string())?;

    let row = state
        .store
        .message_by_id(&message_id.to_string())?
        .ok_or_else(|| ApiError::not_found("message"))?;
    let message = hydrate::message_from_row(&state.store, row)?;

    state
        .dispatcher
        .publish(
            Topic::Chat(chat_id),
            SyncEvent::MessageUpdate {
                message: message.clone(),
            },
        )
        .await;
    // Both chat lists change: the reader's unseen badge clears and the
    // sender's preview picks up the grown seen set.
    let latest_message = latest_message_hydrated(&state, chat_id)?;
    let update = SyncEvent::ChatUpdate {
        chat_id,
        latest_message,
    };
    for raw in [chat_row.user_a, chat_row.user_b] {
        state
            .dispatcher
            .publish(Topic::User(hydrate::parse_id(&raw)?), update.clone())
            .await;
    }

    Ok(Json(message))
}

/// Remove a message. Sender-only; the deleted message comes back in the
/// response so clients can reconcile without a refetch.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .store
        .message_by_id(&message_id.to_string())?
        .ok_or_else(|| ApiError::not_found("message"))?;
    if row.sender_id != identity.id.to_string() {
        return Err(ApiError::forbidden("only the sender can delete a message"));
    }
    let chat_id = hydrate::parse_id(&row.chat_id)?;
    let chat_row = state
        .store
        .chat_by_id(&row.chat_id)?
        .ok_or_else(|| ApiError::not_found("chat"))?;

    // Capture the full message before the rows cascade away.
    let message = hydrate::message_from_row(&state.store, row)?;

    if !state.store.delete_message(&message_id.to_string())? {
        return Err(ApiError::not_found("message"));
    }

    state
        .dispatcher
        .publish(Topic::Chat(chat_id), SyncEvent::MessageDelete { message_id })
        .await;
    let latest_message = latest_message_hydrated(&state, chat_id)?;
    let update = SyncEvent::ChatUpdate {
        chat_id,
        latest_message,
    };
    for raw in [chat_row.user_a, chat_row.user_b] {
        state
            .dispatcher
            .publish(Topic::User(hydrate::parse_id(&raw)?), update.clone())
            .await;
    }

    info!("user {} deleted message {}", identity.id, message_id);

    Ok(Json(message))
}

pub(crate) fn latest_message_hydrated(
    state: &AppState,
    chat_id: Uuid,
) -> Result<Option<Message>, ApiError> {
    match state.store.latest_message(&chat_id.to_string())? {
        Some(row) => Ok(Some(hydrate::message_from_row(&state.store, row)?)),
        None => Ok(None),
    }
}

fn parse_positive(raw: Option<&str>, default: u32, field: &str) -> Result<u32, ApiError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let n: u32 = raw
        .parse()
        .map_err(|_| ApiError::validation(format!("{field} must be a positive integer")))?;
    if n == 0 {
        return Err(ApiError::validation(format!(
            "{field} must be a positive integer"
        )));
    }
    Ok(n)
}
