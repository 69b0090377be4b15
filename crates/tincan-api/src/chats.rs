use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use tincan_db::models::ChatRow;
use tincan_types::api::{CreateChatRequest, DeleteChatResponse, Identity, ToggleMuteResponse};
use tincan_types::events::SyncEvent;
use tincan_types::models::User;
use tincan_types::topic::Topic;

use crate::AppState;
use crate::error::ApiError;
use crate::hydrate;

/// Load a chat row and require the caller to be one of its participants.
pub(crate) fn member_chat_row(
    state: &AppState,
    chat_id: Uuid,
    caller: Uuid,
) -> Result<ChatRow, ApiError> {
    let row = state
        .store
        .chat_by_id(&chat_id.to_string())?
        .ok_or_else(|| ApiError::not_found("chat"))?;
    let caller = caller.to_string();
    if row.user_a != caller && row.user_b != caller {
        return Err(ApiError::forbidden("not a participant of this chat"));
    }
    Ok(row)
}

/// The caller's full profile, for payloads that embed the acting user.
pub(crate) fn current_user(state: &AppState, identity: &Identity) -> Result<User, ApiError> {
    let row = state
        .store
        .user_by_id(&identity.id.to_string())?
        .ok_or(ApiError::Unauthenticated)?;
    Ok(hydrate::user_from_row(row)?)
}

/// All of the caller's chats, most recently active first.
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let chats = state
        .store
        .chats_for_user(&identity.id.to_string())?
        .into_iter()
        .map(|row| hydrate::chat_from_row(&state.store, row))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Json(chats))
}

/// Idempotent on the unordered pair: a second create for the same two users
/// returns the existing chat with 200 instead of 201, and no event fires.
pub async fn create_chat(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.user_id == identity.id {
        return Err(ApiError::validation("cannot start a chat with yourself"));
    }
    if state
        .store
        .user_by_id(&req.user_id.to_string())?
        .is_none()
    {
        return Err(ApiError::not_found("user"));
    }

    if let Some(row) = state
        .store
        .chat_for_pair(&identity.id.to_string(), &req.user_id.to_string())?
    {
        let chat = hydrate::chat_from_row(&state.store, row)?;
        return Ok((StatusCode::OK, Json(chat)));
    }

    let chat_id = Uuid::new_v4();
    state.store.create_chat(
        &chat_id.to_string(),
        &identity.id.to_string(),
        &req.user_id.to_string(),
    )?;
    let row = state
        .store
        .chat_by_id(&chat_id.to_string())?
        .ok_or_else(|| anyhow::anyhow!("chat {} vanished after insert", chat_id))?;
    let chat = hydrate::chat_from_row(&state.store, row)?;

    // Only the other participant is told; the caller has the response.
    state
        .dispatcher
        .publish(Topic::User(req.user_id), SyncEvent::ChatNew { chat: chat.clone() })
        .await;

    info!("user {} started chat {} with {}", identity.id, chat_id, req.user_id);

    Ok((StatusCode::CREATED, Json(chat)))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let row = member_chat_row(&state, chat_id, identity.id)?;
    let participants = [
        hydrate::parse_id(&row.user_a)?,
        hydrate::parse_id(&row.user_b)?,
    ];

    if !state.store.delete_chat(&chat_id.to_string())? {
        return Err(ApiError::not_found("chat"));
    }

    let event = SyncEvent::ChatDelete {
        deleted_chat_id: chat_id,
        remover_id: identity.id,
    };
    for user_id in participants {
        state
            .dispatcher
            .publish(Topic::User(user_id), event.clone())
            .await;
    }

    info!("user {} deleted chat {}", identity.id, chat_id);

    Ok(Json(DeleteChatResponse {
        deleted_chat_id: chat_id,
    }))
}

/// Mute state is caller-local; no event fires.
pub async fn toggle_mute(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    member_chat_row(&state, chat_id, identity.id)?;

    let muted = state
        .store
        .toggle_mute(&chat_id.to_string(), &identity.id.to_string())?;
    let status = if muted { "Chat muted" } else { "Chat unmuted" };

    Ok(Json(ToggleMuteResponse {
        status: status.to_string(),
    }))
}

/// Typing-start goes to the other participant's personal topic, so it lands
/// even while their chat view is closed.
pub async fn start_typing(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let row = member_chat_row(&state, chat_id, identity.id)?;
    let typing_user = current_user(&state, &identity)?;

    let caller = identity.id.to_string();
    let other = if row.user_a == caller { row.user_b } else { row.user_a };
    state
        .dispatcher
        .publish(
            Topic::User(hydrate::parse_id(&other)?),
            SyncEvent::StartTyping { typing_user },
        )
        .await;

    Ok(StatusCode::OK)
}

/// Typing-end goes out on the chat topic itself.
pub async fn end_typing(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    member_chat_row(&state, chat_id, identity.id)?;
    let typing_user = current_user(&state, &identity)?;

    state
        .dispatcher
        .publish(Topic::Chat(chat_id), SyncEvent::EndTyping { typing_user })
        .await;

    Ok(StatusCode::OK)
}
