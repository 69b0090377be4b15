//! Row types mapping directly to SQLite rows. Distinct from the tincan-types
//! API models; hydration into those happens at the API layer.

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub username: Option<String>,
    pub image: Option<String>,
    /// Argon2 hash; None for externally provisioned accounts.
    pub password: Option<String>,
    pub created_at: String,
}

pub struct ChatRow {
    pub id: String,
    pub user_a: String,
    pub user_b: String,
    pub last_message_at: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub body: Option<String>,
    pub image: Option<String>,
    pub reply_to: Option<String>,
    pub created_at: String,
}

pub struct ReactionRow {
    pub id: String,
    pub message_id: String,
    pub sender_id: String,
    pub body: String,
    pub created_at: String,
}
