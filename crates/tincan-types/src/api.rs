use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, User};

// -- Session --

/// JWT claims shared by the REST middleware and the gateway upgrade handler.
/// Canonical definition lives here in tincan-types to avoid drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub username: Option<String>,
    pub image: Option<String>,
    pub exp: usize,
}

/// The caller identity every mutation handler works against, resolved from a
/// valid session token.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
    pub username: Option<String>,
    pub image: Option<String>,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Identity {
            id: claims.sub,
            name: claims.name,
            username: claims.username,
            image: claims.image,
        }
    }
}

// -- Auth --

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    /// Optional at sign-up; backfilled lazily on session refresh when absent.
    pub username: Option<String>,
    pub password: String,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

// -- Chats --

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChatRequest {
    /// The other participant.
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteChatResponse {
    pub deleted_chat_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleMuteResponse {
    /// "Chat muted" or "Chat unmuted".
    pub status: String,
}

// -- Messages --

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub chat_id: Uuid,
    pub body: Option<String>,
    pub image: Option<String>,
    pub reply_to: Option<Uuid>,
}

/// History query params arrive as raw strings so malformed input maps to a
/// validation failure instead of a framework-level rejection.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub chat_id: Option<String>,
    pub limit: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub chat_id: Uuid,
    pub page: u32,
    /// Chronological within the page (oldest first).
    pub messages: Vec<Message>,
}

// -- Reactions --

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ToggleReactionRequest {
    pub body: String,
}
