use axum::middleware;
use axum::routing::{delete, get, patch, post};
use axum::Router;

use crate::{AppState, auth, chats, messages, reactions};

/// The full REST surface. The gateway upgrade route is mounted separately by
/// the server binary, which owns the socket lifecycle.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        // History carries no route-level auth; see get_messages.
        .route("/messages", get(messages::get_messages));

    let protected = Router::new()
        .route("/auth/session", get(auth::session))
        .route("/users", get(auth::list_users))
        .route("/chats", get(chats::list_chats))
        .route("/chat", post(chats::create_chat))
        .route("/chat/{chat_id}", delete(chats::delete_chat))
        .route("/chat/{chat_id}/toggle-mute", patch(chats::toggle_mute))
        .route("/chat/{chat_id}/start-typing", patch(chats::start_typing))
        .route("/chat/{chat_id}/end-typing", patch(chats::end_typing))
        .route("/message", post(messages::send_message))
        .route(
            "/message/{message_id}",
            patch(messages::mark_seen).delete(messages::delete_message),
        )
        .route("/message/{message_id}/react", patch(reactions::toggle_reaction))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::require_auth,
        ));

    public.merge(protected).with_state(state)
}
