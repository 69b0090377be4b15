use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use tincan_types::api::{Identity, ToggleReactionRequest};
use tincan_types::events::SyncEvent;
use tincan_types::models::reaction_allowed;
use tincan_types::topic::Topic;

use crate::AppState;
use crate::chats::member_chat_row;
use crate::error::ApiError;
use crate::hydrate;

/// Toggle the caller's reaction on a message. Either participant can react;
/// the toggle only ever touches the caller's own row. Responds with the full
/// updated message, mirroring the event everyone else receives.
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<ToggleReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !reaction_allowed(&req.body) {
        return Err(ApiError::validation("unsupported reaction"));
    }

    let row = state
        .store
        .message_by_id(&message_id.to_string())?
        .ok_or_else(|| ApiError::not_found("message"))?;
    let chat_id = hydrate::parse_id(&row.chat_id)?;
    member_chat_row(&state, chat_id, identity.id)?;

    let reaction_id = Uuid::new_v4();
    let (added, _id) = state.store.toggle_reaction(
        &reaction_id.to_string(),
        &message_id.to_string(),
        &identity.id.to_string(),
        &req.body,
    )?;

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

    debug!(
        "user {} {} reaction {} on message {}",
        identity.id,
        if added { "added" } else { "removed" },
        req.body,
        message_id
    );

    Ok(Json(message))
}
